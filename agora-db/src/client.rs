use crate::query;
use agora_common::{
    model::{
        AgoraSnowflakeGenerator, Id, ModelValidationError,
        account::{
            Account, AccountHandle, AccountProfile, AccountUpdate, HandleSearch, NewAccount,
        },
        auth::{Session, SessionTokenHash},
        notification::{
            NewNotification, Notification, NotificationKey, NotificationMarker,
            NotificationWithActor,
        },
        page::PageRequest,
        post::{ActivityWeights, CreatePost, Post, PostImage, PostWithActivity},
        relation::{Relation, RelationKey},
    },
    snowflake::{ProcessId, WorkerId},
};
use agora_core::store::{
    AccountId, AccountScope, Credentials, PostId, PostQuery, PostScope, Store, StoreError,
    Transaction,
};
use async_trait::async_trait;
use sqlx::{
    Connection, PgConnection, PgPool, Postgres, migrate::MigrateError, pool::PoolConnection,
    postgres::PgPoolOptions,
};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use time::UtcDateTime;
use tracing::{debug, info};

pub type Result<T, E = DbError> = std::result::Result<T, E>;

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error("Migrations could not be applied: {0}")]
    Migrate(#[from] MigrateError),
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Data(error) => StoreError::Data(error),
            DbError::Sqlx(sqlx::Error::Database(error))
                if error.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                StoreError::Conflict(error.message().to_owned())
            }
            DbError::Sqlx(error) => StoreError::backend(error),
            DbError::Migrate(error) => StoreError::backend(error),
        }
    }
}

/// Opens a pool against `database_url`.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    info!(max_connections, "Connected to database");
    Ok(pool)
}

/// Applies the migrations bundled with this crate.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    info!("Database migrations applied");
    Ok(())
}

pub struct DbClient {
    pool: PgPool,
    snowflake_generator: Mutex<AgoraSnowflakeGenerator>,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        let snowflake_generator = Mutex::new(AgoraSnowflakeGenerator::new(worker_id, process_id));

        Self {
            pool,
            snowflake_generator,
        }
    }

    fn next_id<Marker>(&self, time: UtcDateTime) -> Result<Id<Marker>> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate_at(time)
            .map_err(ModelValidationError::from)?;
        Ok(Id::new(snowflake))
    }

    async fn connection(&self) -> Result<PoolConnection<Postgres>> {
        Ok(self.pool.acquire().await?)
    }
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for DbClient {
    async fn fetch_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::fetch_account(&mut conn, id).await?)
    }

    async fn fetch_profile(&self, id: AccountId) -> Result<Option<AccountProfile>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::fetch_profile(&mut conn, id).await?)
    }

    async fn fetch_credentials(
        &self,
        handle: &AccountHandle,
    ) -> Result<Option<Credentials>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::fetch_credentials(&mut conn, handle).await?)
    }

    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let created_at = UtcDateTime::now();
        let id = self.next_id(created_at)?;
        let mut conn = self.connection().await?;
        let account = query::create_account(&mut conn, id, created_at, &account).await?;

        debug!(id = %account.id, handle = account.handle.get(), "Created account");
        Ok(account)
    }

    async fn update_account(
        &self,
        id: AccountId,
        update: &AccountUpdate,
    ) -> Result<Option<Account>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::update_account(&mut conn, id, update).await?)
    }

    async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::create_session(&mut conn, session).await?)
    }

    async fn fetch_session(
        &self,
        token_hash: &SessionTokenHash,
    ) -> Result<Option<Session>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::fetch_session(&mut conn, token_hash).await?)
    }

    async fn delete_session(&self, token_hash: &SessionTokenHash) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::delete_session(&mut conn, token_hash).await?)
    }

    async fn relation_exists(&self, key: RelationKey) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::relation_exists(&mut conn, key).await?)
    }

    async fn fetch_post(&self, id: PostId) -> Result<Option<Post>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::fetch_post(&mut conn, id).await?)
    }

    async fn fetch_post_details(
        &self,
        id: PostId,
        weights: &ActivityWeights,
    ) -> Result<Option<PostWithActivity>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::fetch_post_details(&mut conn, id, weights).await?)
    }

    async fn fetch_posts(&self, query: &PostQuery) -> Result<Vec<PostWithActivity>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::fetch_posts(&mut conn, query).await?)
    }

    async fn count_posts(&self, scope: PostScope) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::count_posts(&mut conn, scope).await?)
    }

    async fn fetch_accounts(
        &self,
        scope: AccountScope,
        page: PageRequest,
    ) -> Result<Vec<Account>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::fetch_accounts(&mut conn, scope, page).await?)
    }

    async fn count_accounts(&self, scope: AccountScope) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::count_accounts(&mut conn, scope).await?)
    }

    async fn search_accounts(
        &self,
        search: &HandleSearch,
        page: PageRequest,
    ) -> Result<Vec<Account>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::search_accounts(&mut conn, search, page).await?)
    }

    async fn count_search_accounts(&self, search: &HandleSearch) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::count_search_accounts(&mut conn, search).await?)
    }

    async fn fetch_notifications(
        &self,
        recipient: AccountId,
        page: PageRequest,
    ) -> Result<Vec<NotificationWithActor>, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::fetch_notifications(&mut conn, recipient, page).await?)
    }

    async fn count_notifications(&self, recipient: AccountId) -> Result<u64, StoreError> {
        let mut conn = self.connection().await?;
        Ok(query::count_notifications(&mut conn, recipient).await?)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        let tx = self.pool.begin().await.map_err(DbError::from)?;
        Ok(Box::new(PgTransaction { client: self, tx }))
    }
}

/// A database transaction, or a savepoint inside one.
pub struct PgTransaction<'c> {
    client: &'c DbClient,
    tx: sqlx::Transaction<'c, Postgres>,
}

impl PgTransaction<'_> {
    fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }
}

#[async_trait]
impl Transaction for PgTransaction<'_> {
    async fn lock_pair(&mut self, key: &RelationKey) -> Result<(), StoreError> {
        Ok(query::lock_pair(self.conn(), key).await?)
    }

    async fn fetch_account(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(query::fetch_account(self.conn(), id).await?)
    }

    async fn fetch_post(&mut self, id: PostId) -> Result<Option<Post>, StoreError> {
        Ok(query::fetch_post(self.conn(), id).await?)
    }

    async fn fetch_relation(&mut self, key: RelationKey) -> Result<Option<Relation>, StoreError> {
        Ok(query::fetch_relation(self.conn(), key).await?)
    }

    async fn insert_relation(&mut self, key: RelationKey) -> Result<Relation, StoreError> {
        Ok(query::insert_relation(self.conn(), key).await?)
    }

    async fn delete_relation(&mut self, key: RelationKey) -> Result<u64, StoreError> {
        Ok(query::delete_relation(self.conn(), key).await?)
    }

    async fn create_post(
        &mut self,
        post: CreatePost,
    ) -> Result<(Post, Vec<PostImage>), StoreError> {
        let created_at = UtcDateTime::now();
        let id = self.client.next_id(created_at)?;
        let image_ids = post
            .image_urls
            .get()
            .iter()
            .map(|_| self.client.next_id(created_at))
            .collect::<Result<Vec<_>>>()?;

        Ok(query::create_post(self.conn(), id, image_ids, created_at, post).await?)
    }

    async fn delete_post(&mut self, id: PostId) -> Result<u64, StoreError> {
        Ok(query::delete_post(self.conn(), id).await?)
    }

    async fn find_notification(
        &mut self,
        key: NotificationKey,
    ) -> Result<Option<Notification>, StoreError> {
        Ok(query::find_notification(self.conn(), key).await?)
    }

    async fn refresh_notification(
        &mut self,
        id: Id<NotificationMarker>,
    ) -> Result<Option<Notification>, StoreError> {
        Ok(query::refresh_notification(self.conn(), id, UtcDateTime::now()).await?)
    }

    async fn insert_notification(
        &mut self,
        notification: NewNotification,
    ) -> Result<Notification, StoreError> {
        let created_at = UtcDateTime::now();
        let id = self.client.next_id(created_at)?;
        Ok(query::insert_notification(self.conn(), id, created_at, notification).await?)
    }

    async fn savepoint(&mut self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        let client = self.client;
        let tx = Connection::begin(self.conn()).await.map_err(DbError::from)?;
        Ok(Box::new(PgTransaction { client, tx }))
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::client::DbClient;
    use agora_common::{
        model::{
            account::{Account, AccountHandle, AccountUpdate, NewAccount},
            auth::PasswordHashString,
            page::PageRequest,
            relation::{RelationKey, RelationKind},
        },
        snowflake::{ProcessId, WorkerId},
    };
    use agora_core::{
        error::CoreError,
        social::{Social, SocialConfig},
        store::Store,
        viewer::Viewer,
    };
    use sqlx::PgPool;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<DbClient>,
        social: Social,
    }

    impl Fixture {
        fn new(pool: PgPool) -> Self {
            let store = Arc::new(DbClient::new(pool, WorkerId::default(), ProcessId::default()));
            let social = Social::new(store.clone(), SocialConfig::default());
            Self { store, social }
        }

        /// Skips password hashing; these accounts never log in.
        async fn account(&self, handle: &str, is_public: bool) -> Account {
            let account = self
                .store
                .create_account(NewAccount {
                    handle: AccountHandle::new(handle.to_owned()).unwrap(),
                    password_hash: PasswordHashString::new(String::new()),
                })
                .await
                .unwrap();
            if is_public {
                return account;
            }

            let update = AccountUpdate {
                handle: None,
                is_public: Some(false),
            };
            self.store
                .update_account(account.id, &update)
                .await
                .unwrap()
                .unwrap()
        }

        async fn fans(&self, count: usize) -> Vec<Account> {
            let mut fans = Vec::with_capacity(count);
            for fan in 0..count {
                fans.push(self.account(&format!("fan_{fan}"), true).await);
            }
            fans
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn feed_ranks_exact_ties_newest_first(pool: PgPool) {
        let fixture = Fixture::new(pool);
        let author = fixture.account("author", true).await;
        let fans = fixture.fans(8).await;

        let quiet = fixture
            .social
            .create_post(author.id, "no activity".to_owned(), Vec::new())
            .await
            .unwrap()
            .post
            .id;
        let commented = fixture
            .social
            .create_post(author.id, "seven comments".to_owned(), Vec::new())
            .await
            .unwrap()
            .post
            .id;
        let liked = fixture
            .social
            .create_post(author.id, "eight likes".to_owned(), Vec::new())
            .await
            .unwrap()
            .post
            .id;
        for fan in &fans[..7] {
            fixture
                .social
                .create_comment(fan.id, commented, "reply".to_owned(), Vec::new())
                .await
                .unwrap();
        }
        for fan in &fans {
            fixture.social.like(fan.id, liked).await.unwrap();
        }

        let feed = fixture
            .social
            .feed(Viewer::Guest, PageRequest::default())
            .await
            .unwrap();
        let order: Vec<_> = feed.items.iter().map(|item| item.post.id).collect();
        assert_eq!(order, [liked, commented, quiet]);
        assert_eq!(feed.items[0].activity.likes, 8);
        assert_eq!(feed.items[1].activity.comments, 7);
        assert!((feed.items[0].score - feed.items[1].score).abs() < 1e-9);
        assert_eq!(feed.total_pages, 1);

        let second = fixture
            .social
            .feed(Viewer::Guest, PageRequest::new(2, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].post.id, commented);
        assert_eq!(second.total_pages, 3);

        let beyond = fixture
            .social
            .feed(Viewer::Guest, PageRequest::new(4, 1).unwrap())
            .await
            .unwrap();
        assert!(beyond.items.is_empty());
        let huge = fixture
            .social
            .feed(Viewer::Guest, PageRequest::new(i64::MAX, 100).unwrap())
            .await
            .unwrap();
        assert!(huge.items.is_empty());
        assert_eq!(huge.total_pages, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn private_posts_need_an_accepted_request(pool: PgPool) {
        let fixture = Fixture::new(pool);
        let private = fixture.account("private", false).await;
        let follower = fixture.account("follower", true).await;
        let stranger = fixture.account("stranger", true).await;
        let hidden = fixture
            .social
            .create_post(private.id, "followers only".to_owned(), Vec::new())
            .await
            .unwrap()
            .post
            .id;

        for viewer in [Viewer::Guest, Viewer::Account(follower.id)] {
            let feed = fixture
                .social
                .feed(viewer, PageRequest::default())
                .await
                .unwrap();
            assert!(feed.items.is_empty());
        }
        assert!(matches!(
            fixture.social.post(Viewer::Guest, hidden).await,
            Err(CoreError::Forbidden)
        ));

        fixture.social.follow_request(follower.id, private.id).await.unwrap();
        fixture
            .social
            .accept_follow_request(private.id, follower.id)
            .await
            .unwrap();
        let request = RelationKey::new(
            RelationKind::FollowRequest,
            follower.id,
            private.id.snowflake(),
        );
        assert!(!fixture.store.relation_exists(request).await.unwrap());

        let feed = fixture
            .social
            .feed(Viewer::Account(follower.id), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].post.id, hidden);
        assert!(fixture.social.post(Viewer::Account(follower.id), hidden).await.is_ok());

        let posts = fixture
            .social
            .account_posts(Viewer::Account(stranger.id), private.id, PageRequest::default())
            .await;
        assert!(matches!(posts, Err(CoreError::Forbidden)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn relikes_refresh_one_notification(pool: PgPool) {
        let fixture = Fixture::new(pool);
        let author = fixture.account("author", true).await;
        let fan = fixture.account("fan", true).await;
        let post = fixture
            .social
            .create_post(author.id, "likeable".to_owned(), Vec::new())
            .await
            .unwrap()
            .post
            .id;

        assert!(fixture.social.like(fan.id, post).await.unwrap().created().is_some());
        assert!(fixture.social.like(fan.id, post).await.unwrap().created().is_none());
        assert!(fixture.social.like(fan.id, post).await.unwrap().created().is_some());

        let notifications = fixture
            .social
            .notifications(author.id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(notifications.items.len(), 1);
        assert_eq!(notifications.items[0].actor.id, fan.id);
        assert_eq!(notifications.items[0].notification.post_id, post);

        let likers = fixture
            .social
            .likers(Viewer::Guest, post, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(likers.items.len(), 1);
        assert_eq!(likers.items[0].id, fan.id);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn deleting_a_post_removes_its_thread(pool: PgPool) {
        let fixture = Fixture::new(pool);
        let author = fixture.account("author", true).await;
        let fan = fixture.account("fan", true).await;
        let root = fixture
            .social
            .create_post(author.id, "root".to_owned(), Vec::new())
            .await
            .unwrap()
            .post
            .id;
        let reply = fixture
            .social
            .create_comment(fan.id, root, "reply".to_owned(), Vec::new())
            .await
            .unwrap()
            .post
            .id;
        let nested = fixture
            .social
            .create_comment(author.id, reply, "nested".to_owned(), Vec::new())
            .await
            .unwrap()
            .post
            .id;
        fixture.social.like(fan.id, root).await.unwrap();

        assert!(matches!(
            fixture.social.delete_post(fan.id, root).await,
            Err(CoreError::Forbidden)
        ));
        fixture.social.delete_post(author.id, root).await.unwrap();

        for id in [root, reply, nested] {
            assert!(fixture.store.fetch_post(id).await.unwrap().is_none());
        }
        let notifications = fixture
            .social
            .notifications(author.id, PageRequest::default())
            .await
            .unwrap();
        assert!(notifications.items.is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn taken_handles_conflict(pool: PgPool) {
        let fixture = Fixture::new(pool);
        fixture.account("alice", true).await;
        let bob = fixture.account("bob", true).await;

        let registered = fixture
            .social
            .register("alice".to_owned(), "correct horse".to_owned())
            .await;
        assert!(matches!(registered, Err(CoreError::HandleTaken)));

        let renamed = fixture
            .social
            .update_account(bob.id, Some("alice".to_owned()), None)
            .await;
        assert!(matches!(renamed, Err(CoreError::HandleTaken)));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn search_escapes_wildcards(pool: PgPool) {
        let fixture = Fixture::new(pool);
        let underscored = fixture.account("a_b", true).await;
        fixture.account("axb", true).await;
        let popular = fixture.account("the_a_b_club", true).await;
        let fan = fixture.account("fan", true).await;
        fixture.social.follow(fan.id, popular.id).await.unwrap();

        let found = fixture
            .social
            .search_accounts("A_B".to_owned(), PageRequest::default())
            .await
            .unwrap();
        let handles: Vec<_> = found.items.iter().map(|account| account.id).collect();
        assert_eq!(handles, [popular.id, underscored.id]);
        assert_eq!(found.total_pages, 1);
    }
}
