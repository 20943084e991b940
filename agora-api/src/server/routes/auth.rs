use crate::server::{
    Result, ServerError, ServerRouter, SessionConfig,
    auth::{AuthenticatedAccount, RequestSession},
    json::{Created, Json},
};
use agora_common::model::account::{Account, AccountProfile};
use agora_core::social::Social;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(register)
        .typed_post(login)
        .typed_post(logout)
        .typed_get(me)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct CredentialsBody {
    handle: String,
    password: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/register", rejection(ServerError))]
struct RegisterPath();

async fn register(
    RegisterPath(): RegisterPath,
    State(social): State<Arc<Social>>,
    Json(body): Json<CredentialsBody>,
) -> Result<Created<Account>> {
    let account = social.register(body.handle, body.password).await?;

    Ok(Created(account))
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct LoginResponse {
    token: String,
    account: Account,
}

fn session_cookie(config: &SessionConfig, token: &str) -> Result<HeaderValue> {
    let max_age = config
        .lifetime
        .map(|lifetime| format!("; Max-Age={}", lifetime.get().whole_seconds()))
        .unwrap_or_default();
    let cookie = format!(
        "{}={token}; Path=/; HttpOnly; SameSite=Lax{max_age}",
        config.cookie_name
    );

    HeaderValue::from_str(&cookie).map_err(ServerError::from)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login", rejection(ServerError))]
struct LoginPath();

async fn login(
    LoginPath(): LoginPath,
    State(social): State<Arc<Social>>,
    State(session): State<Arc<SessionConfig>>,
    Json(body): Json<CredentialsBody>,
) -> Result<impl IntoResponse> {
    let login = social.login(body.handle, &body.password).await?;
    let token = login.token.as_token_str();
    let cookie = session_cookie(&session, &token)?;

    let response = LoginResponse {
        token,
        account: login.account,
    };
    Ok(([(SET_COOKIE, cookie)], Json(response)))
}

/// Tells the browser to drop the session cookie.
fn expired_cookie(config: &SessionConfig) -> Result<HeaderValue> {
    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        config.cookie_name
    );

    HeaderValue::from_str(&cookie).map_err(ServerError::from)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/logout", rejection(ServerError))]
struct LogoutPath();

async fn logout(
    LogoutPath(): LogoutPath,
    State(social): State<Arc<Social>>,
    State(session): State<Arc<SessionConfig>>,
    RequestSession(token): RequestSession,
) -> Result<impl IntoResponse> {
    social.logout(&token).await?;
    let cookie = expired_cookie(&session)?;

    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/me", rejection(ServerError))]
struct MePath();

async fn me(
    MePath(): MePath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
) -> Result<Json<AccountProfile>> {
    let profile = social.profile(account.id()).await?;

    Ok(Json(profile))
}
