use crate::server::{
    Result, ServerError, ServerRouter, auth::AuthenticatedAccount, json::Json, page::Paging,
};
use agora_common::model::{notification::NotificationWithActor, page::Page};
use agora_core::social::Social;
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(get_notifications)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/notifications", rejection(ServerError))]
struct NotificationsPath();

async fn get_notifications(
    NotificationsPath(): NotificationsPath,
    State(social): State<Arc<Social>>,
    account: AuthenticatedAccount,
    Paging(page): Paging,
) -> Result<Json<Page<NotificationWithActor>>> {
    let notifications = social.notifications(account.id(), page).await?;

    Ok(Json(notifications))
}
