use crate::server::{
    Result, ServerError, ServerRouter,
    auth::{AuthenticatedAccount, RequestViewer},
    json::{Created, Json, ToggleResponse},
    page::Paging,
};
use agora_common::model::{
    Id,
    account::Account,
    page::Page,
    post::{PostMarker, PostWithActivity},
};
use agora_core::{social::Social, viewer::Viewer};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_public_feed)
        .typed_get(get_feed)
        .typed_post(create_post)
        .typed_get(get_post)
        .typed_delete(delete_post)
        .typed_get(get_comments)
        .typed_post(create_comment)
        .typed_post(like_post)
        .typed_post(bookmark_post)
        .typed_get(get_likers)
        .typed_get(get_bookmarkers)
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct PostBody {
    content: String,
    #[serde(default)]
    image_urls: Vec<String>,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/public", rejection(ServerError))]
struct PublicFeedPath();

async fn get_public_feed(
    PublicFeedPath(): PublicFeedPath,
    State(social): State<Arc<Social>>,
    Paging(page): Paging,
) -> Result<Json<Page<PostWithActivity>>> {
    let feed = social.feed(Viewer::Guest, page).await?;

    Ok(Json(feed))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/feed", rejection(ServerError))]
struct FeedPath();

async fn get_feed(
    FeedPath(): FeedPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
    Paging(page): Paging,
) -> Result<Json<Page<PostWithActivity>>> {
    let feed = social.feed(account.id().into(), page).await?;

    Ok(Json(feed))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
    Json(body): Json<PostBody>,
) -> Result<Created<PostWithActivity>> {
    let post = social
        .create_post(account.id(), body.content, body.image_urls)
        .await?;

    Ok(Created(post))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    PostPath { id }: PostPath,
    State(social): State<Arc<Social>>,
    RequestViewer(viewer): RequestViewer,
) -> Result<Json<PostWithActivity>> {
    let post = social.post(viewer, id).await?;

    Ok(Json(post))
}

async fn delete_post(
    PostPath { id }: PostPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
) -> Result<StatusCode> {
    social.delete_post(account.id(), id).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/comments", rejection(ServerError))]
struct CommentsPath {
    id: Id<PostMarker>,
}

async fn get_comments(
    CommentsPath { id }: CommentsPath,
    State(social): State<Arc<Social>>,
    RequestViewer(viewer): RequestViewer,
    Paging(page): Paging,
) -> Result<Json<Page<PostWithActivity>>> {
    let comments = social.comments(viewer, id, page).await?;

    Ok(Json(comments))
}

async fn create_comment(
    CommentsPath { id }: CommentsPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
    Json(body): Json<PostBody>,
) -> Result<Created<PostWithActivity>> {
    let comment = social
        .create_comment(account.id(), id, body.content, body.image_urls)
        .await?;

    Ok(Created(comment))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/like", rejection(ServerError))]
struct LikePath {
    id: Id<PostMarker>,
}

async fn like_post(
    LikePath { id }: LikePath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
) -> Result<ToggleResponse> {
    let toggle = social.like(account.id(), id).await?;

    Ok(ToggleResponse(toggle))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/bookmark", rejection(ServerError))]
struct BookmarkPath {
    id: Id<PostMarker>,
}

async fn bookmark_post(
    BookmarkPath { id }: BookmarkPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
) -> Result<ToggleResponse> {
    let toggle = social.bookmark(account.id(), id).await?;

    Ok(ToggleResponse(toggle))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/likes", rejection(ServerError))]
struct LikersPath {
    id: Id<PostMarker>,
}

async fn get_likers(
    LikersPath { id }: LikersPath,
    State(social): State<Arc<Social>>,
    RequestViewer(viewer): RequestViewer,
    Paging(page): Paging,
) -> Result<Json<Page<Account>>> {
    let likers = social.likers(viewer, id, page).await?;

    Ok(Json(likers))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/{id}/bookmarks", rejection(ServerError))]
struct BookmarkersPath {
    id: Id<PostMarker>,
}

async fn get_bookmarkers(
    BookmarkersPath { id }: BookmarkersPath,
    State(social): State<Arc<Social>>,
    RequestViewer(viewer): RequestViewer,
    Paging(page): Paging,
) -> Result<Json<Page<Account>>> {
    let bookmarkers = social.bookmarkers(viewer, id, page).await?;

    Ok(Json(bookmarkers))
}
