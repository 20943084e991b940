use crate::server::ServerError;
use agora_common::model::page::PageRequest;
use agora_core::error::CoreError;
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::Deserialize;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize)]
struct PageQuery {
    page: Option<i64>,
    limit: Option<i64>,
}

/// `?page=&limit=`, defaulting to the first page of 20.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct Paging(pub PageRequest);

impl<S: Send + Sync> FromRequestParts<S> for Paging {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<PageQuery>::from_request_parts(parts, state).await?;
        let page = PageRequest::from_query(query.page, query.limit).map_err(CoreError::from)?;

        Ok(Self(page))
    }
}
