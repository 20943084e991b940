use crate::server::{
    Result, ServerError, ServerRouter,
    auth::{AuthenticatedAccount, RequestViewer},
    json::{Json, ToggleResponse},
    page::Paging,
};
use agora_common::model::{
    Id,
    account::{Account, AccountMarker, AccountProfile},
    page::Page,
    post::PostWithActivity,
    relation::Relation,
};
use agora_core::social::Social;
use axum::extract::{Query, State, rejection::QueryRejection};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(search_users)
        .typed_get(get_user)
        .typed_patch(update_me)
        .typed_get(get_user_posts)
        .typed_get(get_liked_posts)
        .typed_get(get_bookmarked_posts)
        .typed_get(get_followers)
        .typed_get(get_followings)
        .typed_post(follow)
        .typed_post(follow_request)
        .typed_post(accept_follow_request)
        .typed_get(get_received_requests)
        .typed_get(get_sent_requests)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}", rejection(ServerError))]
struct UserPath {
    id: Id<AccountMarker>,
}

async fn get_user(
    UserPath { id }: UserPath,
    State(social): State<Arc<Social>>,
) -> Result<Json<AccountProfile>> {
    let profile = social.profile(id).await?;

    Ok(Json(profile))
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct SearchQuery {
    q: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/search", rejection(ServerError))]
struct SearchPath();

async fn search_users(
    SearchPath(): SearchPath,
    State(social): State<Arc<Social>>,
    search: std::result::Result<Query<SearchQuery>, QueryRejection>,
    Paging(page): Paging,
) -> Result<Json<Page<Account>>> {
    let Query(search) = search?;
    let found = social.search_accounts(search.q, page).await?;

    Ok(Json(found))
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct AccountChanges {
    handle: Option<String>,
    is_public: Option<bool>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/me", rejection(ServerError))]
struct MePath();

async fn update_me(
    MePath(): MePath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
    Json(changes): Json<AccountChanges>,
) -> Result<Json<Account>> {
    let updated = social
        .update_account(account.id(), changes.handle, changes.is_public)
        .await?;

    Ok(Json(updated))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/posts", rejection(ServerError))]
struct UserPostsPath {
    id: Id<AccountMarker>,
}

async fn get_user_posts(
    UserPostsPath { id }: UserPostsPath,
    State(social): State<Arc<Social>>,
    RequestViewer(viewer): RequestViewer,
    Paging(page): Paging,
) -> Result<Json<Page<PostWithActivity>>> {
    let posts = social.account_posts(viewer, id, page).await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/liked-posts", rejection(ServerError))]
struct LikedPostsPath {
    id: Id<AccountMarker>,
}

async fn get_liked_posts(
    LikedPostsPath { id }: LikedPostsPath,
    State(social): State<Arc<Social>>,
    RequestViewer(viewer): RequestViewer,
    Paging(page): Paging,
) -> Result<Json<Page<PostWithActivity>>> {
    let posts = social.liked_posts(viewer, id, page).await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/bookmarked-posts", rejection(ServerError))]
struct BookmarkedPostsPath {
    id: Id<AccountMarker>,
}

async fn get_bookmarked_posts(
    BookmarkedPostsPath { id }: BookmarkedPostsPath,
    State(social): State<Arc<Social>>,
    RequestViewer(viewer): RequestViewer,
    Paging(page): Paging,
) -> Result<Json<Page<PostWithActivity>>> {
    let posts = social.bookmarked_posts(viewer, id, page).await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/followers", rejection(ServerError))]
struct FollowersPath {
    id: Id<AccountMarker>,
}

async fn get_followers(
    FollowersPath { id }: FollowersPath,
    State(social): State<Arc<Social>>,
    RequestViewer(viewer): RequestViewer,
    Paging(page): Paging,
) -> Result<Json<Page<Account>>> {
    let followers = social.followers(viewer, id, page).await?;

    Ok(Json(followers))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/followings", rejection(ServerError))]
struct FollowingsPath {
    id: Id<AccountMarker>,
}

async fn get_followings(
    FollowingsPath { id }: FollowingsPath,
    State(social): State<Arc<Social>>,
    RequestViewer(viewer): RequestViewer,
    Paging(page): Paging,
) -> Result<Json<Page<Account>>> {
    let followings = social.followings(viewer, id, page).await?;

    Ok(Json(followings))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/follow", rejection(ServerError))]
struct FollowPath {
    id: Id<AccountMarker>,
}

async fn follow(
    FollowPath { id }: FollowPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
) -> Result<ToggleResponse> {
    let toggle = social.follow(account.id(), id).await?;

    Ok(ToggleResponse(toggle))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/follow-request", rejection(ServerError))]
struct FollowRequestPath {
    id: Id<AccountMarker>,
}

async fn follow_request(
    FollowRequestPath { id }: FollowRequestPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
) -> Result<ToggleResponse> {
    let toggle = social.follow_request(account.id(), id).await?;

    Ok(ToggleResponse(toggle))
}

/// `id` is the account that sent the request.
#[derive(TypedPath, Deserialize)]
#[typed_path("/users/{id}/follow-request/accept", rejection(ServerError))]
struct AcceptFollowRequestPath {
    id: Id<AccountMarker>,
}

async fn accept_follow_request(
    AcceptFollowRequestPath { id }: AcceptFollowRequestPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
) -> Result<Json<Relation>> {
    let follow = social.accept_follow_request(account.id(), id).await?;

    Ok(Json(follow))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/me/follow-requests/received", rejection(ServerError))]
struct ReceivedRequestsPath();

async fn get_received_requests(
    ReceivedRequestsPath(): ReceivedRequestsPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
    Paging(page): Paging,
) -> Result<Json<Page<Account>>> {
    let senders = social.requests_received(account.id(), page).await?;

    Ok(Json(senders))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users/me/follow-requests/sent", rejection(ServerError))]
struct SentRequestsPath();

async fn get_sent_requests(
    SentRequestsPath(): SentRequestsPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
    Paging(page): Paging,
) -> Result<Json<Page<Account>>> {
    let receivers = social.requests_sent(account.id(), page).await?;

    Ok(Json(receivers))
}
