//! The storage seam. [`Store`] serves reads outside of transactions and opens
//! [`Transaction`]s; everything that reads and then writes goes through a transaction.
//!
//! "Not found" is always `Ok(None)`; [`StoreError`] is reserved for actual failures.

use crate::viewer::Viewer;
use agora_common::model::{
    Id, ModelValidationError,
    account::{
        Account, AccountHandle, AccountMarker, AccountProfile, AccountUpdate, HandleSearch,
        NewAccount,
    },
    auth::{PasswordHashString, Session, SessionTokenHash},
    notification::{
        NewNotification, Notification, NotificationKey, NotificationMarker, NotificationWithActor,
    },
    page::PageRequest,
    post::{ActivityWeights, CreatePost, Post, PostImage, PostMarker, PostWithActivity},
    relation::{Relation, RelationKey},
};
use async_trait::async_trait;
use thiserror::Error;

pub type AccountId = Id<AccountMarker>;
pub type PostId = Id<PostMarker>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),
    #[error("Storage backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Stored data could not be converted: {0}")]
    Data(#[from] ModelValidationError),
}

impl StoreError {
    pub fn backend(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        StoreError::Backend(Box::new(error))
    }
}

/// An account together with its stored password hash.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Credentials {
    pub account: Account,
    pub password_hash: PasswordHashString,
}

/// Which posts a listing covers.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum PostScope {
    /// Top-level posts whose author is public, followed by the viewer, or the viewer.
    /// Ordered by activity score, then newest first.
    Feed { viewer: Viewer },
    /// Top-level posts by an account, newest first.
    AuthoredBy(AccountId),
    /// Posts an account liked, most recently liked first. Posts whose author the
    /// viewer may not see are left out.
    LikedBy { account: AccountId, viewer: Viewer },
    /// Posts an account bookmarked, most recently bookmarked first. Filtered like
    /// [`PostScope::LikedBy`].
    BookmarkedBy { account: AccountId, viewer: Viewer },
    /// Comments on a post, newest first.
    CommentsOf(PostId),
}

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct PostQuery {
    pub scope: PostScope,
    pub page: PageRequest,
    pub weights: ActivityWeights,
}

/// Which accounts a listing covers. Every listing is ordered by the time the
/// underlying relation was created, newest first.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum AccountScope {
    FollowersOf(AccountId),
    FollowingsOf(AccountId),
    /// Accounts that asked to follow the given account.
    RequestSendersTo(AccountId),
    /// Accounts the given account asked to follow.
    RequestReceiversFrom(AccountId),
    LikersOf(PostId),
    BookmarkersOf(PostId),
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn fetch_profile(&self, id: AccountId) -> Result<Option<AccountProfile>, StoreError>;

    async fn fetch_credentials(
        &self,
        handle: &AccountHandle,
    ) -> Result<Option<Credentials>, StoreError>;

    /// Fails with [`StoreError::Conflict`] if the handle is taken.
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// Fails with [`StoreError::Conflict`] if the new handle is taken.
    async fn update_account(
        &self,
        id: AccountId,
        update: &AccountUpdate,
    ) -> Result<Option<Account>, StoreError>;

    async fn create_session(&self, session: &Session) -> Result<(), StoreError>;

    async fn fetch_session(
        &self,
        token_hash: &SessionTokenHash,
    ) -> Result<Option<Session>, StoreError>;

    /// Returns the number of deleted sessions.
    async fn delete_session(&self, token_hash: &SessionTokenHash) -> Result<u64, StoreError>;

    async fn relation_exists(&self, key: RelationKey) -> Result<bool, StoreError>;

    async fn fetch_post(&self, id: PostId) -> Result<Option<Post>, StoreError>;

    async fn fetch_post_details(
        &self,
        id: PostId,
        weights: &ActivityWeights,
    ) -> Result<Option<PostWithActivity>, StoreError>;

    async fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<PostWithActivity>, StoreError>;

    async fn count_posts(&self, scope: PostScope) -> Result<u64, StoreError>;

    async fn fetch_accounts(
        &self,
        scope: AccountScope,
        page: PageRequest,
    ) -> Result<Vec<Account>, StoreError>;

    async fn count_accounts(&self, scope: AccountScope) -> Result<u64, StoreError>;

    /// Active accounts whose handle matches, most followed first, then newest first.
    async fn search_accounts(
        &self,
        search: &HandleSearch,
        page: PageRequest,
    ) -> Result<Vec<Account>, StoreError>;

    async fn count_search_accounts(&self, search: &HandleSearch) -> Result<u64, StoreError>;

    /// Newest first.
    async fn fetch_notifications(
        &self,
        recipient: AccountId,
        page: PageRequest,
    ) -> Result<Vec<NotificationWithActor>, StoreError>;

    async fn count_notifications(&self, recipient: AccountId) -> Result<u64, StoreError>;

    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError>;
}

/// A unit of work. Dropping it without [`Transaction::commit`] rolls it back.
#[async_trait]
pub trait Transaction: Send {
    /// Serializes all transactions touching the same pair until this one ends.
    async fn lock_pair(&mut self, key: &RelationKey) -> Result<(), StoreError>;

    async fn fetch_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError>;

    async fn fetch_post(&mut self, id: PostId) -> Result<Option<Post>, StoreError>;

    async fn fetch_relation(&mut self, key: RelationKey) -> Result<Option<Relation>, StoreError>;

    async fn insert_relation(&mut self, key: RelationKey) -> Result<Relation, StoreError>;

    /// Returns the number of deleted rows.
    async fn delete_relation(&mut self, key: RelationKey) -> Result<u64, StoreError>;

    async fn create_post(&mut self, post: CreatePost)
    -> Result<(Post, Vec<PostImage>), StoreError>;

    /// Deletes the post along with its comments, images, likes, bookmarks and notifications.
    /// Returns the number of deleted posts, comments included.
    async fn delete_post(&mut self, id: PostId) -> Result<u64, StoreError>;

    async fn find_notification(
        &mut self,
        key: NotificationKey,
    ) -> Result<Option<Notification>, StoreError>;

    /// Moves `created_at` to now. `None` if the notification is gone.
    async fn refresh_notification(
        &mut self,
        id: Id<NotificationMarker>,
    ) -> Result<Option<Notification>, StoreError>;

    async fn insert_notification(
        &mut self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError>;

    /// A nested transaction. Dropping it rolls back only its own changes.
    async fn savepoint(&mut self) -> Result<Box<dyn Transaction + '_>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
