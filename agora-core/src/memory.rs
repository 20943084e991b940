//! A [`Store`] kept in process memory.
//!
//! Transactions take a store-wide lock and work on a copy of the state that replaces
//! the shared state on commit. Savepoints nest the same way.

use crate::{
    store::{
        AccountId, AccountScope, Credentials, PostId, PostQuery, PostScope, Store, StoreError,
        Transaction,
    },
    viewer::Viewer,
};
use agora_common::model::{
    AgoraSnowflakeGenerator, Id, ModelValidationError,
    account::{
        Account, AccountHandle, AccountProfile, AccountUpdate, HandleSearch, NewAccount,
    },
    auth::{PasswordHashString, Session, SessionTokenHash},
    notification::{
        NewNotification, Notification, NotificationKey, NotificationMarker, NotificationWithActor,
    },
    page::PageRequest,
    post::{
        ActivityCounts, ActivityWeights, CreatePost, Post, PostImage, PostImageMarker,
        PostWithActivity,
    },
    relation::{Relation, RelationKey, RelationKind},
};
use agora_common::snowflake::{ProcessId, WorkerId};
use async_trait::async_trait;
use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet},
    sync::{
        Mutex as StdMutex, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
};
use thiserror::Error;
use time::UtcDateTime;
use tokio::sync::{Mutex, MutexGuard};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Injected notification write failure")]
pub struct InjectedFailure;

#[derive(Clone, Debug)]
struct StoredAccount {
    account: Account,
    password_hash: PasswordHashString,
}

#[derive(Clone, Debug, Default)]
struct State {
    accounts: BTreeMap<AccountId, StoredAccount>,
    sessions: Vec<Session>,
    posts: BTreeMap<PostId, Post>,
    images: BTreeMap<Id<PostImageMarker>, PostImage>,
    relations: BTreeMap<RelationKey, Relation>,
    notifications: BTreeMap<Id<NotificationMarker>, Notification>,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    snowflake_generator: StdMutex<AgoraSnowflakeGenerator>,
    failing_notification_writes: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::default(),
            snowflake_generator: StdMutex::new(AgoraSnowflakeGenerator::new(
                WorkerId::default(),
                ProcessId::default(),
            )),
            failing_notification_writes: AtomicU32::new(0),
        }
    }

    /// Makes the next `count` notification inserts or refreshes fail.
    pub fn fail_notification_writes(&self, count: u32) {
        self.failing_notification_writes
            .store(count, Ordering::SeqCst);
    }

    /// Notification write failures that are still pending.
    pub fn pending_notification_failures(&self) -> u32 {
        self.failing_notification_writes.load(Ordering::SeqCst)
    }

    /// Adds an account directly, with a password hash nobody can log in with.
    pub async fn seed_account(&self, handle: &str, is_public: bool) -> Result<Account, StoreError> {
        let handle = AccountHandle::new(handle.to_owned()).map_err(ModelValidationError::from)?;
        let account = self
            .create_account(NewAccount {
                handle,
                password_hash: PasswordHashString::new(String::new()),
            })
            .await?;
        if is_public {
            return Ok(account);
        }

        let update = AccountUpdate {
            handle: None,
            is_public: Some(false),
        };
        self.update_account(account.id, &update)
            .await?
            .ok_or_else(|| StoreError::Conflict(format!("account {} vanished", account.id)))
    }

    fn next_id<Marker>(&self, time: UtcDateTime) -> Result<Id<Marker>, StoreError> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate_at(time)
            .map_err(ModelValidationError::from)?;
        Ok(Id::new(snowflake))
    }

    fn take_injected_failure(&self) -> Result<(), StoreError> {
        let injected = self
            .failing_notification_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pending| {
                pending.checked_sub(1)
            })
            .is_ok();
        if injected {
            Err(StoreError::backend(InjectedFailure))
        } else {
            Ok(())
        }
    }
}

fn page_of<T>(items: impl IntoIterator<Item = T>, page: PageRequest) -> Vec<T> {
    let skip = usize::try_from(page.skip()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(limit).collect()
}

fn count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

impl State {
    fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id).map(|stored| &stored.account)
    }

    fn follows(&self, follower: AccountId, following: AccountId) -> bool {
        self.relations.contains_key(&RelationKey::new(
            RelationKind::Follow,
            follower,
            following.snowflake(),
        ))
    }

    fn can_view(&self, viewer: Viewer, author: AccountId) -> bool {
        let Some(account) = self.account(author) else {
            return false;
        };
        account.is_public
            || viewer.is(author)
            || viewer
                .account()
                .is_some_and(|viewer| self.follows(viewer, author))
    }

    fn relation_count(&self, kind: RelationKind, post: PostId) -> u64 {
        count(
            self.relations
                .values()
                .filter(|relation| relation.kind == kind && relation.subject_id == post.snowflake())
                .count(),
        )
    }

    fn activity(&self, post: PostId) -> ActivityCounts {
        ActivityCounts {
            likes: self.relation_count(RelationKind::Like, post),
            comments: count(
                self.posts
                    .values()
                    .filter(|comment| comment.parent_id == Some(post))
                    .count(),
            ),
            bookmarks: self.relation_count(RelationKind::Bookmark, post),
        }
    }

    fn details(&self, post: &Post, weights: &ActivityWeights) -> Option<PostWithActivity> {
        let author = self.account(post.author_id)?.clone();
        let images = self
            .images
            .values()
            .filter(|image| image.post_id == post.id)
            .cloned()
            .collect();
        let activity = self.activity(post.id);

        Some(PostWithActivity {
            post: post.clone(),
            author,
            images,
            score: activity.score(weights),
            activity,
        })
    }

    fn newest_first(&self, filter: impl Fn(&Post) -> bool) -> Vec<&Post> {
        let mut posts: Vec<_> = self.posts.values().filter(|post| filter(post)).collect();
        posts.sort_by_key(|post| Reverse((post.created_at, post.id)));
        posts
    }

    fn related_posts(&self, kind: RelationKind, account: AccountId, viewer: Viewer) -> Vec<&Post> {
        let mut relations: Vec<_> = self
            .relations
            .values()
            .filter(|relation| relation.kind == kind && relation.actor_id == account)
            .collect();
        relations.sort_by_key(|relation| Reverse((relation.created_at, relation.subject_id)));

        relations
            .into_iter()
            .filter_map(|relation| self.posts.get(&Id::new(relation.subject_id)))
            .filter(|post| self.can_view(viewer, post.author_id))
            .collect()
    }

    fn select_posts(&self, scope: PostScope, weights: &ActivityWeights) -> Vec<PostWithActivity> {
        let posts = match scope {
            PostScope::Feed { viewer } => {
                let mut ranked: Vec<_> = self
                    .posts
                    .values()
                    .filter(|post| post.is_top_level() && self.can_view(viewer, post.author_id))
                    .filter_map(|post| self.details(post, weights))
                    .collect();
                ranked.sort_by_key(|details| {
                    Reverse((
                        details.activity.rank(weights),
                        details.post.created_at,
                        details.post.id,
                    ))
                });
                return ranked;
            }
            PostScope::AuthoredBy(author) => {
                self.newest_first(|post| post.is_top_level() && post.author_id == author)
            }
            PostScope::LikedBy { account, viewer } => {
                self.related_posts(RelationKind::Like, account, viewer)
            }
            PostScope::BookmarkedBy { account, viewer } => {
                self.related_posts(RelationKind::Bookmark, account, viewer)
            }
            PostScope::CommentsOf(parent) => {
                self.newest_first(|post| post.parent_id == Some(parent))
            }
        };

        posts
            .into_iter()
            .filter_map(|post| self.details(post, weights))
            .collect()
    }

    fn select_accounts(&self, scope: AccountScope) -> Vec<Account> {
        let (kind, anchor, anchor_is_subject) = match scope {
            AccountScope::FollowersOf(id) => (RelationKind::Follow, id.snowflake(), true),
            AccountScope::FollowingsOf(id) => (RelationKind::Follow, id.snowflake(), false),
            AccountScope::RequestSendersTo(id) => {
                (RelationKind::FollowRequest, id.snowflake(), true)
            }
            AccountScope::RequestReceiversFrom(id) => {
                (RelationKind::FollowRequest, id.snowflake(), false)
            }
            AccountScope::LikersOf(post) => (RelationKind::Like, post.snowflake(), true),
            AccountScope::BookmarkersOf(post) => (RelationKind::Bookmark, post.snowflake(), true),
        };
        let listed = |relation: &Relation| -> AccountId {
            if anchor_is_subject {
                relation.actor_id
            } else {
                Id::new(relation.subject_id)
            }
        };

        let mut relations: Vec<_> = self
            .relations
            .values()
            .filter(|relation| relation.kind == kind)
            .filter(|relation| {
                if anchor_is_subject {
                    relation.subject_id == anchor
                } else {
                    relation.actor_id.snowflake() == anchor
                }
            })
            .collect();
        relations.sort_by_key(|relation| Reverse((relation.created_at, listed(relation))));

        relations
            .into_iter()
            .filter_map(|relation| self.account(listed(relation)).cloned())
            .collect()
    }

    fn search_accounts(&self, search: &HandleSearch) -> Vec<Account> {
        let mut found: Vec<_> = self
            .accounts
            .values()
            .map(|stored| &stored.account)
            .filter(|account| account.is_active && search.matches(&account.handle))
            .map(|account| {
                let followers = self.select_accounts(AccountScope::FollowersOf(account.id)).len();
                (followers, account)
            })
            .collect();
        found.sort_by_key(|(followers, account)| {
            Reverse((*followers, account.created_at, account.id))
        });

        found
            .into_iter()
            .map(|(_, account)| account.clone())
            .collect()
    }

    fn delete_post(&mut self, id: PostId) -> u64 {
        let mut doomed = BTreeSet::from([id]);
        let mut frontier = vec![id];
        while let Some(parent) = frontier.pop() {
            for post in self.posts.values() {
                if post.parent_id == Some(parent) && doomed.insert(post.id) {
                    frontier.push(post.id);
                }
            }
        }

        self.posts.retain(|id, _| !doomed.contains(id));
        self.images.retain(|_, image| !doomed.contains(&image.post_id));
        self.relations.retain(|key, _| {
            !matches!(key.kind, RelationKind::Like | RelationKind::Bookmark)
                || !doomed.contains(&Id::new(key.subject))
        });
        self.notifications
            .retain(|_, notification| !doomed.contains(&notification.post_id));

        count(doomed.len())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.state.lock().await.account(id).cloned())
    }

    async fn fetch_profile(&self, id: AccountId) -> Result<Option<AccountProfile>, StoreError> {
        let state = self.state.lock().await;
        let Some(account) = state.account(id).cloned() else {
            return Ok(None);
        };

        let post_count = count(
            state
                .posts
                .values()
                .filter(|post| post.is_top_level() && post.author_id == id)
                .count(),
        );
        Ok(Some(AccountProfile {
            account,
            post_count,
            follower_count: count(state.select_accounts(AccountScope::FollowersOf(id)).len()),
            following_count: count(state.select_accounts(AccountScope::FollowingsOf(id)).len()),
        }))
    }

    async fn fetch_credentials(
        &self,
        handle: &AccountHandle,
    ) -> Result<Option<Credentials>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|stored| &stored.account.handle == handle)
            .map(|stored| Credentials {
                account: stored.account.clone(),
                password_hash: stored.password_hash.clone(),
            }))
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut state = self.state.lock().await;
        if state
            .accounts
            .values()
            .any(|stored| stored.account.handle == account.handle)
        {
            return Err(StoreError::Conflict(format!(
                "handle {} is taken",
                account.handle.get()
            )));
        }

        let created_at = UtcDateTime::now();
        let created = Account {
            id: self.next_id(created_at)?,
            handle: account.handle,
            is_public: true,
            is_active: true,
            created_at,
        };
        state.accounts.insert(
            created.id,
            StoredAccount {
                account: created.clone(),
                password_hash: account.password_hash,
            },
        );
        Ok(created)
    }

    async fn update_account(
        &self,
        id: AccountId,
        update: &AccountUpdate,
    ) -> Result<Option<Account>, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(handle) = &update.handle
            && state
                .accounts
                .values()
                .any(|stored| &stored.account.handle == handle && stored.account.id != id)
        {
            return Err(StoreError::Conflict(format!(
                "handle {} is taken",
                handle.get()
            )));
        }

        let Some(stored) = state.accounts.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(handle) = &update.handle {
            stored.account.handle = handle.clone();
        }
        if let Some(is_public) = update.is_public {
            stored.account.is_public = is_public;
        }
        Ok(Some(stored.account.clone()))
    }

    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        self.state.lock().await.sessions.push(session.clone());
        Ok(())
    }

    async fn fetch_session(
        &self,
        token_hash: &SessionTokenHash,
    ) -> Result<Option<Session>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .iter()
            .find(|session| &session.token_hash == token_hash)
            .cloned())
    }

    async fn delete_session(&self, token_hash: &SessionTokenHash) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.sessions.len();
        state
            .sessions
            .retain(|session| &session.token_hash != token_hash);
        Ok(count(before - state.sessions.len()))
    }

    async fn relation_exists(&self, key: RelationKey) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.relations.contains_key(&key))
    }

    async fn fetch_post(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        Ok(self.state.lock().await.posts.get(&id).cloned())
    }

    async fn fetch_post_details(
        &self,
        id: PostId,
        weights: &ActivityWeights,
    ) -> Result<Option<PostWithActivity>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .posts
            .get(&id)
            .and_then(|post| state.details(post, weights)))
    }

    async fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<PostWithActivity>, StoreError> {
        let state = self.state.lock().await;
        Ok(page_of(
            state.select_posts(query.scope, &query.weights),
            query.page,
        ))
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(count(
            state
                .select_posts(scope, &ActivityWeights::default())
                .len(),
        ))
    }

    async fn fetch_accounts(
        &self,
        scope: AccountScope,
        page: PageRequest,
    ) -> Result<Vec<Account>, StoreError> {
        let state = self.state.lock().await;
        Ok(page_of(state.select_accounts(scope), page))
    }

    async fn count_accounts(&self, scope: AccountScope) -> Result<u64, StoreError> {
        Ok(count(self.state.lock().await.select_accounts(scope).len()))
    }

    async fn search_accounts(
        &self,
        search: &HandleSearch,
        page: PageRequest,
    ) -> Result<Vec<Account>, StoreError> {
        let state = self.state.lock().await;
        Ok(page_of(state.search_accounts(search), page))
    }

    async fn count_search_accounts(&self, search: &HandleSearch) -> Result<u64, StoreError> {
        Ok(count(self.state.lock().await.search_accounts(search).len()))
    }

    async fn fetch_notifications(
        &self,
        recipient: AccountId,
        page: PageRequest,
    ) -> Result<Vec<NotificationWithActor>, StoreError> {
        let state = self.state.lock().await;
        let mut notifications: Vec<_> = state
            .notifications
            .values()
            .filter(|notification| notification.recipient_id == recipient)
            .collect();
        notifications
            .sort_by_key(|notification| Reverse((notification.created_at, notification.id)));

        let with_actors = notifications.into_iter().filter_map(|notification| {
            Some(NotificationWithActor {
                notification: notification.clone(),
                actor: state.account(notification.actor_id)?.clone(),
            })
        });
        Ok(page_of(with_actors, page))
    }

    async fn count_notifications(&self, recipient: AccountId) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(count(
            state
                .notifications
                .values()
                .filter(|notification| notification.recipient_id == recipient)
                .count(),
        ))
    }

    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        let guard = self.state.lock().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTransaction {
            store: self,
            target: Target::Root(guard),
            working,
        }))
    }
}

enum Target<'a> {
    Root(MutexGuard<'a, State>),
    Savepoint(&'a mut State),
}

pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    target: Target<'a>,
    working: State,
}

#[async_trait]
impl Transaction for MemoryTransaction<'_> {
    async fn lock_pair(&mut self, _key: &RelationKey) -> Result<(), StoreError> {
        // The whole store is already locked.
        Ok(())
    }

    async fn fetch_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.working.account(id).cloned())
    }

    async fn fetch_post(&mut self, id: PostId) -> Result<Option<Post>, StoreError> {
        Ok(self.working.posts.get(&id).cloned())
    }

    async fn fetch_relation(&mut self, key: RelationKey) -> Result<Option<Relation>, StoreError> {
        Ok(self.working.relations.get(&key).copied())
    }

    async fn insert_relation(&mut self, key: RelationKey) -> Result<Relation, StoreError> {
        if self.working.relations.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "{} from {} to {} exists",
                key.kind, key.actor, key.subject
            )));
        }

        let relation = Relation {
            kind: key.kind,
            actor_id: key.actor,
            subject_id: key.subject,
            created_at: UtcDateTime::now(),
        };
        self.working.relations.insert(key, relation);
        Ok(relation)
    }

    async fn delete_relation(&mut self, key: RelationKey) -> Result<u64, StoreError> {
        Ok(u64::from(self.working.relations.remove(&key).is_some()))
    }

    async fn create_post(
        &mut self,
        post: CreatePost,
    ) -> Result<(Post, Vec<PostImage>), StoreError> {
        let created_at = UtcDateTime::now();
        let created = Post {
            id: self.store.next_id(created_at)?,
            author_id: post.author,
            parent_id: post.parent,
            content: post.content,
            created_at,
        };

        let mut images = Vec::new();
        for url in post.image_urls.into_inner() {
            let image = PostImage {
                id: self.store.next_id(created_at)?,
                post_id: created.id,
                url,
            };
            self.working.images.insert(image.id, image.clone());
            images.push(image);
        }

        self.working.posts.insert(created.id, created.clone());
        Ok((created, images))
    }

    async fn delete_post(&mut self, id: PostId) -> Result<u64, StoreError> {
        if !self.working.posts.contains_key(&id) {
            return Ok(0);
        }
        Ok(self.working.delete_post(id))
    }

    async fn find_notification(
        &mut self,
        key: NotificationKey,
    ) -> Result<Option<Notification>, StoreError> {
        Ok(self
            .working
            .notifications
            .values()
            .find(|notification| {
                notification.actor_id == key.actor
                    && notification.post_id == key.post
                    && notification.kind == key.kind
            })
            .cloned())
    }

    async fn refresh_notification(
        &mut self,
        id: Id<NotificationMarker>,
    ) -> Result<Option<Notification>, StoreError> {
        self.store.take_injected_failure()?;
        Ok(self.working.notifications.get_mut(&id).map(|notification| {
            notification.created_at = UtcDateTime::now();
            notification.clone()
        }))
    }

    async fn insert_notification(
        &mut self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        self.store.take_injected_failure()?;
        if self.find_notification(notification.key).await?.is_some() {
            return Err(StoreError::Conflict(format!(
                "{} notification from {} on {} exists",
                notification.key.kind, notification.key.actor, notification.key.post
            )));
        }

        let created_at = UtcDateTime::now();
        let created = Notification {
            id: self.store.next_id(created_at)?,
            recipient_id: notification.recipient,
            actor_id: notification.key.actor,
            kind: notification.key.kind,
            post_id: notification.key.post,
            created_at,
        };
        self.working
            .notifications
            .insert(created.id, created.clone());
        Ok(created)
    }

    async fn savepoint(&mut self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        let working = self.working.clone();
        Ok(Box::new(MemoryTransaction {
            store: self.store,
            target: Target::Savepoint(&mut self.working),
            working,
        }))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            target, working, ..
        } = *self;
        match target {
            Target::Root(mut guard) => *guard = working,
            Target::Savepoint(parent) => *parent = working,
        }
        Ok(())
    }
}
