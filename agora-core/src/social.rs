use crate::{
    error::{CoreError, Result},
    feed::{feed, list_posts},
    follow_request,
    notify::{RetryPolicy, notify},
    store::{AccountId, AccountScope, PostId, PostScope, Store, StoreError},
    toggle::{Bookmark, Follow, Like, Toggle, toggle},
    viewer::Viewer,
    visibility::{can_view_in, ensure_can_view},
};
use agora_common::{
    model::{
        ModelValidationError,
        account::{
            Account, AccountHandle, AccountProfile, AccountUpdate, HandleSearch, NewAccount,
        },
        auth::{Password, Session, SessionToken},
        notification::{NotificationKey, NotificationKind, NotificationWithActor},
        page::{Page, PageRequest},
        post::{ActivityWeights, CreatePost, ImageUrl, PostContent, PostImageUrls, PostWithActivity},
        relation::Relation,
    },
    util::PositiveDuration,
};
use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};
use time::UtcDateTime;
use tracing::{debug, info};

#[derive(Copy, Clone, PartialEq, Debug, Default)]
pub struct SocialConfig {
    pub weights: ActivityWeights,
    pub retry: RetryPolicy,
    /// `None` issues sessions that never expire.
    pub session_lifetime: Option<PositiveDuration>,
}

/// A freshly issued session.
#[derive(Clone, Debug)]
pub struct Login {
    pub token: SessionToken,
    pub account: Account,
}

/// The operations of the social network, on top of a [`Store`].
#[derive(Clone)]
pub struct Social {
    store: Arc<dyn Store>,
    config: SocialConfig,
}

impl Debug for Social {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Social")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn invalid_content(error: impl Into<ModelValidationError>) -> CoreError {
    CoreError::InvalidContent(error.into())
}

impl Social {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: SocialConfig) -> Self {
        Self { store, config }
    }

    pub async fn register(&self, handle: String, password: String) -> Result<Account> {
        let handle = AccountHandle::new(handle)?;
        let password_hash = Password::new(password)?.hash()?;

        let account = self
            .store
            .create_account(NewAccount {
                handle,
                password_hash,
            })
            .await
            .map_err(|error| match error {
                StoreError::Conflict(_) => CoreError::HandleTaken,
                other => other.into(),
            })?;

        info!(account = %account.id, handle = account.handle.get(), "Registered account");
        Ok(account)
    }

    pub async fn login(&self, handle: String, password: &str) -> Result<Login> {
        let handle = AccountHandle::new(handle).map_err(|_| CoreError::InvalidCredentials)?;
        let credentials = self
            .store
            .fetch_credentials(&handle)
            .await?
            .filter(|credentials| credentials.account.is_active)
            .ok_or(CoreError::InvalidCredentials)?;

        if !credentials.password_hash.verify(password) {
            return Err(CoreError::InvalidCredentials);
        }

        let token = SessionToken::generate_random(credentials.account.id);
        let session = Session {
            account: credentials.account.id,
            token_hash: token.hash()?,
            created_at: UtcDateTime::now(),
            expires_after: self.config.session_lifetime,
        };
        self.store.create_session(&session).await?;

        debug!(account = %session.account, "Issued session");
        Ok(Login {
            token,
            account: credentials.account,
        })
    }

    /// The active account owning the session `token` belongs to.
    pub async fn resolve_session(&self, token: &str) -> Result<Account> {
        let token: SessionToken = token.parse().map_err(|_| CoreError::InvalidSession)?;
        let token_hash = token.hash()?;

        let session = self
            .store
            .fetch_session(&token_hash)
            .await?
            .ok_or(CoreError::InvalidSession)?;

        if session.account != token.account_id || session.is_expired_at(UtcDateTime::now()) {
            return Err(CoreError::InvalidSession);
        }

        self.store
            .fetch_account(session.account)
            .await?
            .filter(|account| account.is_active)
            .ok_or(CoreError::InvalidSession)
    }

    /// Revokes the session `token` belongs to.
    pub async fn logout(&self, token: &str) -> Result<()> {
        let token: SessionToken = token.parse().map_err(|_| CoreError::InvalidSession)?;
        let revoked = self.store.delete_session(&token.hash()?).await?;
        if revoked == 0 {
            return Err(CoreError::InvalidSession);
        }

        debug!(account = %token.account_id, "Revoked session");
        Ok(())
    }

    pub async fn search_accounts(&self, text: String, page: PageRequest) -> Result<Page<Account>> {
        let search = HandleSearch::new(text)?;
        let total = self.store.count_search_accounts(&search).await?;
        let items = self.store.search_accounts(&search, page).await?;
        Ok(Page::new(items, page, total))
    }

    pub async fn profile(&self, id: AccountId) -> Result<AccountProfile> {
        self.store
            .fetch_profile(id)
            .await?
            .ok_or(CoreError::AccountNotFound(id))
    }

    pub async fn update_account(
        &self,
        owner: AccountId,
        handle: Option<String>,
        is_public: Option<bool>,
    ) -> Result<Account> {
        let update = AccountUpdate {
            handle: handle.map(AccountHandle::new).transpose()?,
            is_public,
        };

        let updated = self
            .store
            .update_account(owner, &update)
            .await
            .map_err(|error| match error {
                StoreError::Conflict(_) => CoreError::HandleTaken,
                other => other.into(),
            })?
            .ok_or(CoreError::AccountNotFound(owner))?;

        debug!(account = %owner, ?update, "Updated account");
        Ok(updated)
    }

    async fn visible_account(&self, viewer: Viewer, id: AccountId) -> Result<Account> {
        let account = self
            .store
            .fetch_account(id)
            .await?
            .ok_or(CoreError::AccountNotFound(id))?;
        ensure_can_view(&*self.store, viewer, &account).await?;
        Ok(account)
    }

    async fn list_accounts(&self, scope: AccountScope, page: PageRequest) -> Result<Page<Account>> {
        let total = self.store.count_accounts(scope).await?;
        let items = self.store.fetch_accounts(scope, page).await?;
        Ok(Page::new(items, page, total))
    }

    pub async fn feed(&self, viewer: Viewer, page: PageRequest) -> Result<Page<PostWithActivity>> {
        feed(&*self.store, viewer, page, self.config.weights).await
    }

    pub async fn account_posts(
        &self,
        viewer: Viewer,
        account: AccountId,
        page: PageRequest,
    ) -> Result<Page<PostWithActivity>> {
        self.visible_account(viewer, account).await?;
        list_posts(
            &*self.store,
            PostScope::AuthoredBy(account),
            page,
            self.config.weights,
        )
        .await
    }

    pub async fn liked_posts(
        &self,
        viewer: Viewer,
        account: AccountId,
        page: PageRequest,
    ) -> Result<Page<PostWithActivity>> {
        self.visible_account(viewer, account).await?;
        list_posts(
            &*self.store,
            PostScope::LikedBy { account, viewer },
            page,
            self.config.weights,
        )
        .await
    }

    pub async fn bookmarked_posts(
        &self,
        viewer: Viewer,
        account: AccountId,
        page: PageRequest,
    ) -> Result<Page<PostWithActivity>> {
        self.visible_account(viewer, account).await?;
        list_posts(
            &*self.store,
            PostScope::BookmarkedBy { account, viewer },
            page,
            self.config.weights,
        )
        .await
    }

    pub async fn followers(
        &self,
        viewer: Viewer,
        account: AccountId,
        page: PageRequest,
    ) -> Result<Page<Account>> {
        self.visible_account(viewer, account).await?;
        self.list_accounts(AccountScope::FollowersOf(account), page)
            .await
    }

    pub async fn followings(
        &self,
        viewer: Viewer,
        account: AccountId,
        page: PageRequest,
    ) -> Result<Page<Account>> {
        self.visible_account(viewer, account).await?;
        self.list_accounts(AccountScope::FollowingsOf(account), page)
            .await
    }

    pub async fn requests_received(
        &self,
        owner: AccountId,
        page: PageRequest,
    ) -> Result<Page<Account>> {
        self.list_accounts(AccountScope::RequestSendersTo(owner), page)
            .await
    }

    pub async fn requests_sent(
        &self,
        owner: AccountId,
        page: PageRequest,
    ) -> Result<Page<Account>> {
        self.list_accounts(AccountScope::RequestReceiversFrom(owner), page)
            .await
    }

    pub async fn notifications(
        &self,
        owner: AccountId,
        page: PageRequest,
    ) -> Result<Page<NotificationWithActor>> {
        let total = self.store.count_notifications(owner).await?;
        let items = self.store.fetch_notifications(owner, page).await?;
        Ok(Page::new(items, page, total))
    }

    pub async fn post(&self, viewer: Viewer, id: PostId) -> Result<PostWithActivity> {
        let post = self
            .store
            .fetch_post_details(id, &self.config.weights)
            .await?
            .ok_or(CoreError::PostNotFound(id))?;
        ensure_can_view(&*self.store, viewer, &post.author).await?;
        Ok(post)
    }

    pub async fn comments(
        &self,
        viewer: Viewer,
        id: PostId,
        page: PageRequest,
    ) -> Result<Page<PostWithActivity>> {
        self.post(viewer, id).await?;
        list_posts(
            &*self.store,
            PostScope::CommentsOf(id),
            page,
            self.config.weights,
        )
        .await
    }

    /// Accounts that liked a visible post, most recent like first.
    pub async fn likers(
        &self,
        viewer: Viewer,
        id: PostId,
        page: PageRequest,
    ) -> Result<Page<Account>> {
        self.post(viewer, id).await?;
        self.list_accounts(AccountScope::LikersOf(id), page).await
    }

    /// Accounts that bookmarked a visible post, most recent bookmark first.
    pub async fn bookmarkers(
        &self,
        viewer: Viewer,
        id: PostId,
        page: PageRequest,
    ) -> Result<Page<Account>> {
        self.post(viewer, id).await?;
        self.list_accounts(AccountScope::BookmarkersOf(id), page)
            .await
    }

    fn validate_post(
        author: AccountId,
        parent: Option<PostId>,
        content: String,
        image_urls: Vec<String>,
    ) -> Result<CreatePost> {
        let content = PostContent::new(content).map_err(invalid_content)?;
        let urls = image_urls
            .into_iter()
            .map(ImageUrl::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid_content)?;
        let image_urls = PostImageUrls::new(urls).map_err(invalid_content)?;

        Ok(CreatePost {
            author,
            parent,
            content,
            image_urls,
        })
    }

    async fn created_post(&self, id: PostId) -> Result<PostWithActivity> {
        self.store
            .fetch_post_details(id, &self.config.weights)
            .await?
            .ok_or(CoreError::PostNotFound(id))
    }

    pub async fn create_post(
        &self,
        author: AccountId,
        content: String,
        image_urls: Vec<String>,
    ) -> Result<PostWithActivity> {
        let create = Self::validate_post(author, None, content, image_urls)?;

        let mut tx = self.store.begin().await?;
        let (post, _) = tx.create_post(create).await?;
        tx.commit().await?;

        debug!(post = %post.id, %author, "Created post");
        self.created_post(post.id).await
    }

    /// Comments on `parent` and notifies its author, both or neither.
    pub async fn create_comment(
        &self,
        author: AccountId,
        parent: PostId,
        content: String,
        image_urls: Vec<String>,
    ) -> Result<PostWithActivity> {
        let create = Self::validate_post(author, Some(parent), content, image_urls)?;

        let mut tx = self.store.begin().await?;
        let parent_post = tx
            .fetch_post(parent)
            .await?
            .ok_or(CoreError::PostNotFound(parent))?;
        let parent_author = tx
            .fetch_account(parent_post.author_id)
            .await?
            .ok_or(CoreError::AccountNotFound(parent_post.author_id))?;
        if !can_view_in(&mut *tx, Viewer::Account(author), &parent_author).await? {
            return Err(CoreError::Forbidden);
        }

        let (post, _) = tx.create_post(create).await?;
        let key = NotificationKey {
            actor: author,
            post: parent,
            kind: NotificationKind::Comment,
        };
        notify(&mut *tx, parent_author.id, key, self.config.retry).await?;
        tx.commit().await?;

        debug!(post = %post.id, %parent, %author, "Created comment");
        self.created_post(post.id).await
    }

    /// Only the author may delete a post; its comments and engagement go with it.
    pub async fn delete_post(&self, owner: AccountId, id: PostId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let post = tx
            .fetch_post(id)
            .await?
            .ok_or(CoreError::PostNotFound(id))?;
        if post.author_id != owner {
            return Err(CoreError::Forbidden);
        }

        let deleted = tx.delete_post(id).await?;
        tx.commit().await?;

        debug!(post = %id, deleted, "Deleted post");
        Ok(())
    }

    /// Likes or unlikes a post. A new like notifies the post's author in the same
    /// transaction; if that fails the like is rolled back too.
    pub async fn like(&self, actor: AccountId, post: PostId) -> Result<Toggle> {
        let mut tx = self.store.begin().await?;
        let outcome = toggle::<Like>(&mut *tx, actor, post).await?;

        if outcome.created().is_some() {
            let owner = tx
                .fetch_post(post)
                .await?
                .ok_or(CoreError::PostNotFound(post))?
                .author_id;
            let key = NotificationKey {
                actor,
                post,
                kind: NotificationKind::Like,
            };
            notify(&mut *tx, owner, key, self.config.retry).await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn bookmark(&self, actor: AccountId, post: PostId) -> Result<Toggle> {
        let mut tx = self.store.begin().await?;
        let outcome = toggle::<Bookmark>(&mut *tx, actor, post).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Follows a public account, or unfollows any account.
    pub async fn follow(&self, actor: AccountId, target: AccountId) -> Result<Toggle> {
        let mut tx = self.store.begin().await?;
        let outcome = toggle::<Follow>(&mut *tx, actor, target).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    /// Asks a private account for a follow, or withdraws the pending request.
    pub async fn follow_request(&self, actor: AccountId, target: AccountId) -> Result<Toggle> {
        let mut tx = self.store.begin().await?;
        let outcome = follow_request::request(&mut *tx, actor, target).await?;
        tx.commit().await?;
        Ok(outcome)
    }

    pub async fn accept_follow_request(
        &self,
        receiver: AccountId,
        sender: AccountId,
    ) -> Result<Relation> {
        let mut tx = self.store.begin().await?;
        let follow = follow_request::accept(&mut *tx, receiver, sender).await?;
        tx.commit().await?;
        Ok(follow)
    }
}
