use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::Router;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};

mod auth;
mod notifications;
mod posts;
mod users;

pub fn routes() -> ServerRouter {
    Router::new()
        .typed_get(health)
        .merge(auth::routes())
        .merge(posts::routes())
        .merge(users::routes())
        .merge(notifications::routes())
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/health", rejection(ServerError))]
struct HealthPath();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct Health {
    status: &'static str,
}

async fn health(HealthPath(): HealthPath) -> Result<Json<Health>> {
    Ok(Json(Health { status: "ok" }))
}

#[cfg(test)]
mod tests {
    use crate::server::{ServerState, SessionConfig, routes};
    use agora_core::{
        memory::MemoryStore,
        social::{Social, SocialConfig},
    };
    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{
            Method, Request, StatusCode,
            header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
        },
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let social = Social::new(Arc::new(MemoryStore::new()), SocialConfig::default());
        let state = ServerState {
            social: Arc::new(social),
            session: Arc::new(SessionConfig {
                cookie_name: "auth_token".to_owned(),
                lifetime: None,
            }),
        };
        routes().with_state(state)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn sign_up(app: &Router, handle: &str) -> String {
        let credentials = json!({ "handle": handle, "password": "correct horse" });
        let (status, _) = send(
            app,
            Method::POST,
            "/auth/register",
            None,
            Some(credentials.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, login) = send(app, Method::POST, "/auth/login", None, Some(credentials)).await;
        assert_eq!(status, StatusCode::OK);
        login["token"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (status, body) = send(&app(), Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn like_toggles_and_notifies() {
        let app = app();
        let author = sign_up(&app, "author").await;
        let fan = sign_up(&app, "fan").await;

        let (status, post) = send(
            &app,
            Method::POST,
            "/posts",
            Some(&author),
            Some(json!({ "content": "hello agora" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let like = format!("/posts/{}/like", post["id"]);

        let (status, toggle) = send(&app, Method::POST, &like, Some(&fan), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(toggle["status"], "created");
        assert_eq!(toggle["kind"], "like");

        let (status, toggle) = send(&app, Method::POST, &like, Some(&fan), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(toggle, json!({ "status": "removed" }));

        let (status, notifications) =
            send(&app, Method::GET, "/notifications", Some(&author), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(notifications["items"].as_array().unwrap().len(), 1);
        assert_eq!(notifications["items"][0]["kind"], "like");

        let (status, feed) = send(&app, Method::GET, "/posts/public?limit=5", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(feed["total_pages"], 1);
        assert_eq!(feed["items"][0]["id"], post["id"]);
    }

    #[tokio::test]
    async fn sessions_are_read_from_cookies() {
        let app = app();
        let token = sign_up(&app, "cookie_jar").await;

        let request = Request::builder()
            .uri("/auth/me")
            .header(COOKIE, format!("auth_token={token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let credentials = json!({ "handle": "cookie_jar", "password": "correct horse" });
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(credentials.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("auth_token="));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn errors_carry_their_status() {
        let app = app();
        let token = sign_up(&app, "visitor").await;

        let (status, body) = send(&app, Method::GET, "/posts/12345", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], 404);
        assert!(body["message"].is_string());

        let (status, _) = send(
            &app,
            Method::POST,
            "/posts",
            None,
            Some(json!({ "content": "anonymous" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Method::GET, "/auth/me", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, Method::GET, "/posts/public?limit=101", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/posts",
            Some(&token),
            Some(json!({ "content": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "handle": "visitor", "password": "another one" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn private_accounts_need_accepted_requests() {
        let app = app();
        let private = sign_up(&app, "private").await;
        let follower = sign_up(&app, "follower").await;

        let (status, me) = send(
            &app,
            Method::PATCH,
            "/users/me",
            Some(&private),
            Some(json!({ "is_public": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let private_id = me["id"].clone();
        let (_, follower_me) = send(&app, Method::GET, "/auth/me", Some(&follower), None).await;
        let follower_id = follower_me["id"].clone();

        let posts = format!("/users/{private_id}/posts");
        let (status, _) = send(&app, Method::GET, &posts, Some(&follower), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/users/{private_id}/follow"),
            Some(&follower),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, request) = send(
            &app,
            Method::POST,
            &format!("/users/{private_id}/follow-request"),
            Some(&follower),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(request["kind"], "follow_request");

        let (_, received) = send(
            &app,
            Method::GET,
            "/users/me/follow-requests/received",
            Some(&private),
            None,
        )
        .await;
        assert_eq!(received["items"][0]["id"], follower_id);

        let (status, follow) = send(
            &app,
            Method::POST,
            &format!("/users/{follower_id}/follow-request/accept"),
            Some(&private),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(follow["kind"], "follow");

        let (status, page) = send(&app, Method::GET, &posts, Some(&follower), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total_pages"], 0);
    }

    #[tokio::test]
    async fn logout_revokes_and_clears_the_cookie() {
        let app = app();
        let token = sign_up(&app, "leaving").await;

        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/logout")
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookie = response.headers()[SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("auth_token=;"));
        assert!(cookie.contains("Max-Age=0"));

        let (status, _) = send(&app, Method::GET, "/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = send(&app, Method::POST, "/auth/logout", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn search_and_engagement_listings() {
        let app = app();
        let author = sign_up(&app, "author").await;
        let fan = sign_up(&app, "fan_club").await;

        let (status, found) = send(&app, Method::GET, "/users/search?q=FAN", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found["items"][0]["handle"], "fan_club");
        assert_eq!(found["total_pages"], 1);
        let (status, _) = send(&app, Method::GET, "/users/search", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, post) = send(
            &app,
            Method::POST,
            "/posts",
            Some(&author),
            Some(json!({ "content": "popular" })),
        )
        .await;
        let id = &post["id"];
        send(&app, Method::POST, &format!("/posts/{id}/like"), Some(&fan), None).await;

        let (status, likers) =
            send(&app, Method::GET, &format!("/posts/{id}/likes"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(likers["items"][0]["handle"], "fan_club");

        let (status, bookmarkers) =
            send(&app, Method::GET, &format!("/posts/{id}/bookmarks"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(bookmarkers["items"], json!([]));
    }
}
