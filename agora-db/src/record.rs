use agora_common::model::{
    ModelValidationError,
    account::{Account, AccountHandle, AccountProfile},
    auth::{PasswordHashString, Session},
    notification::{Notification, NotificationWithActor},
    post::{
        ActivityCounts, ActivityWeights, ImageUrl, Post, PostContent, PostImage, PostWithActivity,
    },
    relation::{Relation, RelationKind},
};
use agora_core::store::Credentials;
use sqlx::FromRow;
use time::{Duration, PrimitiveDateTime, UtcDateTime};

pub(crate) fn primitive(time: UtcDateTime) -> PrimitiveDateTime {
    PrimitiveDateTime::new(time.date(), time.time())
}

fn count(value: i64) -> Result<u64, ModelValidationError> {
    u64::try_from(value).map_err(|_| ModelValidationError::NegativeCount(value))
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct AccountRecord {
    pub account_snowflake: i64,
    pub handle: String,
    pub is_public: bool,
    pub is_active: bool,
    pub created_at: PrimitiveDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct CredentialsRecord {
    #[sqlx(flatten)]
    pub account: AccountRecord,
    pub password_hash: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct ProfileRecord {
    #[sqlx(flatten)]
    pub account: AccountRecord,
    pub post_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct SessionRecord {
    pub account_snowflake: i64,
    pub token_hash: Vec<u8>,
    pub created_at: PrimitiveDateTime,
    pub expires_after_seconds: Option<i64>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub account_snowflake: i64,
    pub parent_snowflake: Option<i64>,
    pub content: String,
    pub created_at: PrimitiveDateTime,
}

/// A post joined with its author and activity counts.
#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostDetailsRecord {
    #[sqlx(flatten)]
    pub post: PostRecord,
    pub author_handle: String,
    pub author_is_public: bool,
    pub author_is_active: bool,
    pub author_created_at: PrimitiveDateTime,
    pub likes: i64,
    pub comments: i64,
    pub bookmarks: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct ImageRecord {
    pub image_snowflake: i64,
    pub post_snowflake: i64,
    pub url: String,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct RelationRecord {
    pub actor_snowflake: i64,
    pub subject_snowflake: i64,
    pub created_at: PrimitiveDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct NotificationRecord {
    pub notification_snowflake: i64,
    pub recipient_snowflake: i64,
    pub actor_snowflake: i64,
    pub kind: String,
    pub post_snowflake: i64,
    pub created_at: PrimitiveDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct NotificationWithActorRecord {
    #[sqlx(flatten)]
    pub notification: NotificationRecord,
    pub actor_handle: String,
    pub actor_is_public: bool,
    pub actor_is_active: bool,
    pub actor_created_at: PrimitiveDateTime,
}

impl TryFrom<AccountRecord> for Account {
    type Error = ModelValidationError;

    fn try_from(value: AccountRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.account_snowflake.cast_unsigned().into(),
            handle: AccountHandle::new(value.handle)?,
            is_public: value.is_public,
            is_active: value.is_active,
            created_at: value.created_at.as_utc(),
        })
    }
}

impl TryFrom<CredentialsRecord> for Credentials {
    type Error = ModelValidationError;

    fn try_from(value: CredentialsRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            account: value.account.try_into()?,
            password_hash: PasswordHashString::new(value.password_hash),
        })
    }
}

impl TryFrom<ProfileRecord> for AccountProfile {
    type Error = ModelValidationError;

    fn try_from(value: ProfileRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            account: value.account.try_into()?,
            post_count: count(value.post_count)?,
            follower_count: count(value.follower_count)?,
            following_count: count(value.following_count)?,
        })
    }
}

impl TryFrom<SessionRecord> for Session {
    type Error = ModelValidationError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            account: value.account_snowflake.cast_unsigned().into(),
            token_hash: value.token_hash.into_boxed_slice().try_into()?,
            created_at: value.created_at.as_utc(),
            expires_after: value
                .expires_after_seconds
                .map(|seconds| Duration::seconds(seconds).try_into())
                .transpose()?,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.post_snowflake.cast_unsigned().into(),
            author_id: value.account_snowflake.cast_unsigned().into(),
            parent_id: value
                .parent_snowflake
                .map(|parent| parent.cast_unsigned().into()),
            content: PostContent::new(value.content)?,
            created_at: value.created_at.as_utc(),
        })
    }
}

impl PostDetailsRecord {
    /// Images are attached by the caller.
    pub fn into_details(
        self,
        weights: &ActivityWeights,
    ) -> Result<PostWithActivity, ModelValidationError> {
        let author = Account {
            id: self.post.account_snowflake.cast_unsigned().into(),
            handle: AccountHandle::new(self.author_handle)?,
            is_public: self.author_is_public,
            is_active: self.author_is_active,
            created_at: self.author_created_at.as_utc(),
        };
        let activity = ActivityCounts {
            likes: count(self.likes)?,
            comments: count(self.comments)?,
            bookmarks: count(self.bookmarks)?,
        };

        Ok(PostWithActivity {
            post: self.post.try_into()?,
            author,
            images: Vec::new(),
            score: activity.score(weights),
            activity,
        })
    }
}

impl TryFrom<ImageRecord> for PostImage {
    type Error = ModelValidationError;

    fn try_from(value: ImageRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.image_snowflake.cast_unsigned().into(),
            post_id: value.post_snowflake.cast_unsigned().into(),
            url: ImageUrl::new(value.url)?,
        })
    }
}

impl RelationRecord {
    pub fn into_relation(self, kind: RelationKind) -> Relation {
        Relation {
            kind,
            actor_id: self.actor_snowflake.cast_unsigned().into(),
            subject_id: self.subject_snowflake.cast_unsigned().into(),
            created_at: self.created_at.as_utc(),
        }
    }
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = ModelValidationError;

    fn try_from(value: NotificationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.notification_snowflake.cast_unsigned().into(),
            recipient_id: value.recipient_snowflake.cast_unsigned().into(),
            actor_id: value.actor_snowflake.cast_unsigned().into(),
            kind: value.kind.parse()?,
            post_id: value.post_snowflake.cast_unsigned().into(),
            created_at: value.created_at.as_utc(),
        })
    }
}

impl TryFrom<NotificationWithActorRecord> for NotificationWithActor {
    type Error = ModelValidationError;

    fn try_from(value: NotificationWithActorRecord) -> Result<Self, Self::Error> {
        let actor = Account {
            id: value.notification.actor_snowflake.cast_unsigned().into(),
            handle: AccountHandle::new(value.actor_handle)?,
            is_public: value.actor_is_public,
            is_active: value.actor_is_active,
            created_at: value.actor_created_at.as_utc(),
        };

        Ok(Self {
            notification: value.notification.try_into()?,
            actor,
        })
    }
}
