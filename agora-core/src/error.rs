use crate::store::{AccountId, PostId, StoreError};
use agora_common::model::{
    ModelValidationError,
    account::{InvalidAccountHandleError, InvalidHandleSearchError},
    auth::{InvalidPasswordError, PasswordHashingError, SessionTokenHashError},
    page::InvalidPageError,
    relation::RelationKind,
};
use thiserror::Error;

pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// A state the requested change is not allowed from.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum PreconditionError {
    #[error("Accounts cannot {0} themselves")]
    SelfRelation(RelationKind),
    #[error("Private accounts can only be followed through a follow request")]
    TargetPrivate,
    #[error("Public accounts can be followed directly")]
    TargetPublic,
    #[error("The account is already followed")]
    AlreadyFollowing,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Account {0} was not found")]
    AccountNotFound(AccountId),
    #[error("Post {0} was not found")]
    PostNotFound(PostId),
    #[error("No follow request from {sender} to {receiver}")]
    FollowRequestNotFound {
        sender: AccountId,
        receiver: AccountId,
    },
    #[error("Not allowed to access this resource")]
    Forbidden,
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("Expected to remove exactly one {kind} row, removed {affected}")]
    IntegrityViolation { kind: RelationKind, affected: u64 },
    #[error("Notification could not be written after {attempts} attempts")]
    NotificationFailed { attempts: u32 },
    #[error(transparent)]
    InvalidPage(#[from] InvalidPageError),
    #[error("Invalid content: {0}")]
    InvalidContent(ModelValidationError),
    #[error(transparent)]
    InvalidHandle(#[from] InvalidAccountHandleError),
    #[error(transparent)]
    InvalidPassword(#[from] InvalidPasswordError),
    #[error(transparent)]
    InvalidSearch(#[from] InvalidHandleSearchError),
    #[error("The handle is already taken")]
    HandleTaken,
    #[error("Unknown handle or wrong password")]
    InvalidCredentials,
    #[error("The session is unknown or expired")]
    InvalidSession,
    #[error(transparent)]
    PasswordHashing(#[from] PasswordHashingError),
    #[error(transparent)]
    SessionTokenHashing(#[from] SessionTokenHashError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
