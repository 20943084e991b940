use agora_common::util::PositiveDuration;
use agora_core::{error::CoreError, social::Social, store::StoreError};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri, header::InvalidHeaderValue},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

mod auth;
mod json;
mod page;
mod routes;

pub type ServerRouter = Router<ServerState>;

/// How sessions are handed to clients.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// `None` issues session cookies that end with the browser session.
    pub lifetime: Option<PositiveDuration>,
}

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub social: Arc<Social>,
    pub session: Arc<SessionConfig>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Query rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("Response header could not be built: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),
    #[error("No session token was provided")]
    MissingSession,
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ServerError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_) | ServerError::PathRejection(_) => StatusCode::NOT_FOUND,
            ServerError::QueryRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::InvalidAuthorizationHeader(_) => StatusCode::BAD_REQUEST,
            ServerError::MissingSession => StatusCode::UNAUTHORIZED,
            ServerError::JsonResponse(_) | ServerError::HeaderValue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Core(error) => core_status(error),
        }
    }
}

fn core_status(error: &CoreError) -> StatusCode {
    match error {
        CoreError::AccountNotFound(_)
        | CoreError::PostNotFound(_)
        | CoreError::FollowRequestNotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::Forbidden => StatusCode::FORBIDDEN,
        CoreError::Precondition(_)
        | CoreError::InvalidPage(_)
        | CoreError::InvalidContent(_)
        | CoreError::InvalidHandle(_)
        | CoreError::InvalidPassword(_)
        | CoreError::InvalidSearch(_) => StatusCode::BAD_REQUEST,
        CoreError::HandleTaken | CoreError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
        CoreError::InvalidCredentials | CoreError::InvalidSession => StatusCode::UNAUTHORIZED,
        CoreError::IntegrityViolation { .. }
        | CoreError::NotificationFailed { .. }
        | CoreError::PasswordHashing(_)
        | CoreError::SessionTokenHashing(_)
        | CoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
struct ErrorResponse {
    status: u16,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let message = if status.is_server_error() {
            status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_owned()
        } else {
            self.to_string()
        };
        let error_response = ErrorResponse {
            status: status.as_u16(),
            message,
        };
        (status, Json(error_response)).into_response()
    }
}
