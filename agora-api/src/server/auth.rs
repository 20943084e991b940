use crate::server::{ServerError, SessionConfig};
use agora_common::model::account::Account;
use agora_core::{social::Social, store::AccountId, viewer::Viewer};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::TypedHeader;
use headers::{Authorization, Cookie, authorization::Bearer};
use std::sync::Arc;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// A bearer token takes precedence over the session cookie.
async fn session_token<S>(parts: &mut Parts, state: &S) -> Result<Option<String>, ServerError>
where
    Arc<SessionConfig>: FromRef<S>,
    S: Send + Sync,
{
    if parts.headers.contains_key(AUTHORIZATION) {
        let header = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?;
        return Ok(Some(header.token().to_owned()));
    }

    let session = Arc::<SessionConfig>::from_ref(state);
    let token = TypedHeader::<Cookie>::from_request_parts(parts, state)
        .await
        .ok()
        .and_then(|TypedHeader(cookie)| cookie.get(&session.cookie_name).map(str::to_owned));
    Ok(token)
}

/// The raw session token of the request. Requests without one are rejected.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct RequestSession(pub String);

impl<S> FromRequestParts<S> for RequestSession
where
    Arc<SessionConfig>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = session_token(parts, state)
            .await?
            .ok_or(ServerError::MissingSession)?;

        Ok(Self(token))
    }
}

/// The account owning the session of the request. Requests without one are rejected.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedAccount(pub Account);

impl AuthenticatedAccount {
    #[must_use]
    pub fn id(&self) -> AccountId {
        self.0.id
    }
}

impl<S> FromRequestParts<S> for AuthenticatedAccount
where
    Arc<Social>: FromRef<S>,
    Arc<SessionConfig>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let RequestSession(token) = RequestSession::from_request_parts(parts, state).await?;
        let account = Arc::<Social>::from_ref(state)
            .resolve_session(&token)
            .await?;

        Ok(Self(account))
    }
}

/// Who is looking. Requests without a session are guests, invalid sessions are rejected.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct RequestViewer(pub Viewer);

impl<S> FromRequestParts<S> for RequestViewer
where
    Arc<Social>: FromRef<S>,
    Arc<SessionConfig>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = session_token(parts, state).await? else {
            return Ok(Self(Viewer::Guest));
        };
        let account = Arc::<Social>::from_ref(state)
            .resolve_session(&token)
            .await?;

        Ok(Self(Viewer::Account(account.id)))
    }
}
