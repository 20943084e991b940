use crate::server::ServerError;
use agora_core::toggle::Toggle;
use axum::{
    Json as AxumJson,
    extract::FromRequest,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use headers::ContentType;
use serde::Serialize;

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(AxumJson), rejection(ServerError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(json) => (TypedHeader(ContentType::json()), json).into_response(),
            Err(err) => ServerError::JsonResponse(err).into_response(),
        }
    }
}

/// A JSON body answered with `201 Created`.
#[derive(Debug, Clone, Copy)]
pub struct Created<T>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self.0)).into_response()
    }
}

/// `201` with the new relation, or `200` once it was removed.
#[derive(Debug, Clone, Copy)]
pub struct ToggleResponse(pub Toggle);

impl IntoResponse for ToggleResponse {
    fn into_response(self) -> Response {
        match self.0 {
            Toggle::Created(_) => Created(self.0).into_response(),
            Toggle::Removed => Json(self.0).into_response(),
        }
    }
}
