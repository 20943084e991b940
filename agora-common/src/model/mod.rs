pub mod account;
pub mod auth;
pub mod notification;
pub mod page;
pub mod post;
pub mod relation;

use crate::{
    model::{
        account::InvalidAccountHandleError,
        auth::InvalidSessionTokenHashError,
        notification::UnknownNotificationKindError,
        post::{InvalidImageUrlError, InvalidPostContentError, TooManyImagesError},
    },
    snowflake::{Epoch, Snowflake, SnowflakeGenerator, SnowflakeTimestampError},
    util::NonPositiveDurationError,
};
use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use std::{fmt::Display, marker::PhantomData};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    AccountHandle(#[from] InvalidAccountHandleError),
    #[error(transparent)]
    PostContent(#[from] InvalidPostContentError),
    #[error(transparent)]
    ImageUrl(#[from] InvalidImageUrlError),
    #[error(transparent)]
    TooManyImages(#[from] TooManyImagesError),
    #[error(transparent)]
    NotificationKind(#[from] UnknownNotificationKindError),
    #[error(transparent)]
    NonPositiveDuration(#[from] NonPositiveDurationError),
    #[error(transparent)]
    TokenHash(#[from] InvalidSessionTokenHashError),
    #[error("Snowflake could not be generated: {0}")]
    Snowflake(#[from] SnowflakeTimestampError),
    #[error("A count column was negative: {0}")]
    NegativeCount(i64),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AgoraEpoch;
impl Epoch for AgoraEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type AgoraSnowflake = Snowflake<AgoraEpoch>;
pub type AgoraSnowflakeGenerator = SnowflakeGenerator<AgoraEpoch>;

/// A snowflake tagged with the kind of object it identifies.
#[derive_where(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Debug,
    Default,
    Hash,
    Serialize,
    Deserialize
)]
#[serde(transparent)]
pub struct Id<Marker>(AgoraSnowflake, #[serde(skip)] PhantomData<Marker>);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: AgoraSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> AgoraSnowflake {
        self.0
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Reinterprets the snowflake as an id of another kind.
    #[must_use]
    pub fn cast<Other>(self) -> Id<Other> {
        Id::new(self.0)
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> From<AgoraSnowflake> for Id<Marker> {
    fn from(value: AgoraSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<Id<Marker>> for AgoraSnowflake {
    fn from(value: Id<Marker>) -> Self {
        value.0
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(AgoraSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.get()
    }
}
