//! Queries shared by [`DbClient`](crate::client::DbClient) and
//! [`PgTransaction`](crate::client::PgTransaction). Everything runs on a plain connection so
//! pooled reads and transactional reads go through the same code.

use crate::{
    client::Result,
    record::{
        AccountRecord, CredentialsRecord, ImageRecord, NotificationRecord,
        NotificationWithActorRecord, PostDetailsRecord, PostRecord, ProfileRecord, RelationRecord,
        SessionRecord, primitive,
    },
};
use agora_common::model::{
    Id,
    account::{Account, AccountHandle, AccountProfile, AccountUpdate, HandleSearch, NewAccount},
    auth::{Session, SessionTokenHash},
    notification::{
        NewNotification, Notification, NotificationKey, NotificationMarker, NotificationWithActor,
    },
    page::PageRequest,
    post::{ActivityWeights, CreatePost, Post, PostImage, PostImageMarker, PostWithActivity},
    relation::{Relation, RelationKey, RelationKind},
};
use agora_core::{
    store::{AccountId, AccountScope, Credentials, PostId, PostQuery, PostScope},
    viewer::Viewer,
};
use sqlx::{PgConnection, query, query_as, query_scalar};
use std::collections::HashMap;
use time::UtcDateTime;

fn bigint<Marker>(id: Id<Marker>) -> i64 {
    id.get().cast_signed()
}

fn viewer_param(viewer: Viewer) -> Option<i64> {
    viewer.account().map(bigint)
}

/// Offsets beyond `i64::MAX` clamp to it, which still selects nothing.
fn limit_offset(page: PageRequest) -> (i64, i64) {
    let offset = i64::try_from(page.skip()).unwrap_or(i64::MAX);
    (page.limit().cast_signed(), offset)
}

fn count(value: i64) -> u64 {
    value.cast_unsigned()
}

fn relation_table(kind: RelationKind) -> &'static str {
    match kind {
        RelationKind::Like => "engagement.likes",
        RelationKind::Bookmark => "engagement.bookmarks",
        RelationKind::Follow => "graph.follows",
        RelationKind::FollowRequest => "graph.follow_requests",
    }
}

const ACCOUNT_COLUMNS: &str = "
    accounts.account_snowflake,
    accounts.handle,
    accounts.is_public,
    accounts.is_active,
    accounts.created_at
";

/// Posts joined with their author and activity counts, followed by the given clauses.
macro_rules! post_details {
    ($($tail:literal),+ $(,)?) => {
        concat!(
            "
            SELECT
                posts.post_snowflake,
                posts.account_snowflake,
                posts.parent_snowflake,
                posts.content,
                posts.created_at,
                authors.handle AS author_handle,
                authors.is_public AS author_is_public,
                authors.is_active AS author_is_active,
                authors.created_at AS author_created_at,
                (
                    SELECT COUNT(*) FROM engagement.likes
                    WHERE likes.subject_snowflake = posts.post_snowflake
                ) AS likes,
                (
                    SELECT COUNT(*) FROM posts.posts AS comments
                    WHERE comments.parent_snowflake = posts.post_snowflake
                ) AS comments,
                (
                    SELECT COUNT(*) FROM engagement.bookmarks
                    WHERE bookmarks.subject_snowflake = posts.post_snowflake
                ) AS bookmarks
            FROM
                posts.posts
                JOIN accounts.accounts AS authors
                    ON authors.account_snowflake = posts.account_snowflake
            ",
            $($tail),+
        )
    };
}

const NOTIFICATION_COLUMNS: &str = "
    notifications.notification_snowflake,
    notifications.recipient_snowflake,
    notifications.actor_snowflake,
    notifications.kind,
    notifications.post_snowflake,
    notifications.created_at
";

pub(crate) async fn fetch_account(
    conn: &mut PgConnection,
    id: AccountId,
) -> Result<Option<Account>> {
    let sql = format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts.accounts WHERE accounts.account_snowflake = $1"
    );
    let record = query_as::<_, AccountRecord>(&sql)
        .bind(bigint(id))
        .fetch_optional(conn)
        .await?;

    let account = record.map(Account::try_from).transpose()?;
    Ok(account)
}

pub(crate) async fn fetch_profile(
    conn: &mut PgConnection,
    id: AccountId,
) -> Result<Option<AccountProfile>> {
    let sql = format!(
        "
        SELECT
            {ACCOUNT_COLUMNS},
            (
                SELECT COUNT(*) FROM posts.posts
                WHERE posts.account_snowflake = accounts.account_snowflake
                    AND posts.parent_snowflake IS NULL
            ) AS post_count,
            (
                SELECT COUNT(*) FROM graph.follows
                WHERE follows.subject_snowflake = accounts.account_snowflake
            ) AS follower_count,
            (
                SELECT COUNT(*) FROM graph.follows
                WHERE follows.actor_snowflake = accounts.account_snowflake
            ) AS following_count
        FROM
            accounts.accounts
        WHERE
            accounts.account_snowflake = $1
        "
    );
    let record = query_as::<_, ProfileRecord>(&sql)
        .bind(bigint(id))
        .fetch_optional(conn)
        .await?;

    let profile = record.map(AccountProfile::try_from).transpose()?;
    Ok(profile)
}

pub(crate) async fn fetch_credentials(
    conn: &mut PgConnection,
    handle: &AccountHandle,
) -> Result<Option<Credentials>> {
    let sql = format!(
        "
        SELECT {ACCOUNT_COLUMNS}, accounts.password_hash
        FROM accounts.accounts
        WHERE accounts.handle = $1
        "
    );
    let record = query_as::<_, CredentialsRecord>(&sql)
        .bind(handle.get())
        .fetch_optional(conn)
        .await?;

    let credentials = record.map(Credentials::try_from).transpose()?;
    Ok(credentials)
}

pub(crate) async fn create_account(
    conn: &mut PgConnection,
    id: AccountId,
    created_at: UtcDateTime,
    account: &NewAccount,
) -> Result<Account> {
    let sql = format!(
        "
        INSERT INTO accounts.accounts (account_snowflake, handle, password_hash, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING {ACCOUNT_COLUMNS}
        "
    );
    let record = query_as::<_, AccountRecord>(&sql)
        .bind(bigint(id))
        .bind(account.handle.get())
        .bind(account.password_hash.get())
        .bind(primitive(created_at))
        .fetch_one(conn)
        .await?;

    Ok(record.try_into()?)
}

pub(crate) async fn update_account(
    conn: &mut PgConnection,
    id: AccountId,
    update: &AccountUpdate,
) -> Result<Option<Account>> {
    let sql = format!(
        "
        UPDATE accounts.accounts
        SET
            handle = COALESCE($2, accounts.handle),
            is_public = COALESCE($3, accounts.is_public)
        WHERE accounts.account_snowflake = $1
        RETURNING {ACCOUNT_COLUMNS}
        "
    );
    let record = query_as::<_, AccountRecord>(&sql)
        .bind(bigint(id))
        .bind(update.handle.as_ref().map(AccountHandle::get))
        .bind(update.is_public)
        .fetch_optional(conn)
        .await?;

    let account = record.map(Account::try_from).transpose()?;
    Ok(account)
}

pub(crate) async fn create_session(conn: &mut PgConnection, session: &Session) -> Result<()> {
    query(
        "
        INSERT INTO accounts.sessions
            (token_hash, account_snowflake, created_at, expires_after_seconds)
        VALUES ($1, $2, $3, $4)
        ",
    )
    .bind(session.token_hash.as_ref())
    .bind(bigint(session.account))
    .bind(primitive(session.created_at))
    .bind(
        session
            .expires_after
            .map(|lifetime| lifetime.get().whole_seconds()),
    )
    .execute(conn)
    .await?;

    Ok(())
}

pub(crate) async fn fetch_session(
    conn: &mut PgConnection,
    token_hash: &SessionTokenHash,
) -> Result<Option<Session>> {
    let record = query_as::<_, SessionRecord>(
        "
        SELECT
            sessions.account_snowflake,
            sessions.token_hash,
            sessions.created_at,
            sessions.expires_after_seconds
        FROM
            accounts.sessions
        WHERE
            sessions.token_hash = $1
        ",
    )
    .bind(token_hash.as_ref())
    .fetch_optional(conn)
    .await?;

    let session = record.map(Session::try_from).transpose()?;
    Ok(session)
}

pub(crate) async fn delete_session(
    conn: &mut PgConnection,
    token_hash: &SessionTokenHash,
) -> Result<u64> {
    let result = query("DELETE FROM accounts.sessions WHERE sessions.token_hash = $1")
        .bind(token_hash.as_ref())
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

/// Blocks until no other transaction holds the lock for the pair. Released on commit or
/// rollback of the surrounding transaction.
pub(crate) async fn lock_pair(conn: &mut PgConnection, key: &RelationKey) -> Result<()> {
    query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key.lock_key())
        .execute(conn)
        .await?;

    Ok(())
}

pub(crate) async fn fetch_relation(
    conn: &mut PgConnection,
    key: RelationKey,
) -> Result<Option<Relation>> {
    let sql = format!(
        "
        SELECT actor_snowflake, subject_snowflake, created_at
        FROM {}
        WHERE actor_snowflake = $1 AND subject_snowflake = $2
        ",
        relation_table(key.kind)
    );
    let record = query_as::<_, RelationRecord>(&sql)
        .bind(bigint(key.actor))
        .bind(key.subject.get().cast_signed())
        .fetch_optional(conn)
        .await?;

    Ok(record.map(|record| record.into_relation(key.kind)))
}

pub(crate) async fn insert_relation(conn: &mut PgConnection, key: RelationKey) -> Result<Relation> {
    let sql = format!(
        "
        INSERT INTO {} (actor_snowflake, subject_snowflake)
        VALUES ($1, $2)
        RETURNING actor_snowflake, subject_snowflake, created_at
        ",
        relation_table(key.kind)
    );
    let record = query_as::<_, RelationRecord>(&sql)
        .bind(bigint(key.actor))
        .bind(key.subject.get().cast_signed())
        .fetch_one(conn)
        .await?;

    Ok(record.into_relation(key.kind))
}

pub(crate) async fn delete_relation(conn: &mut PgConnection, key: RelationKey) -> Result<u64> {
    let sql = format!(
        "DELETE FROM {} WHERE actor_snowflake = $1 AND subject_snowflake = $2",
        relation_table(key.kind)
    );
    let result = query(&sql)
        .bind(bigint(key.actor))
        .bind(key.subject.get().cast_signed())
        .execute(conn)
        .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn fetch_post(conn: &mut PgConnection, id: PostId) -> Result<Option<Post>> {
    let record = query_as::<_, PostRecord>(
        "
        SELECT
            posts.post_snowflake,
            posts.account_snowflake,
            posts.parent_snowflake,
            posts.content,
            posts.created_at
        FROM
            posts.posts
        WHERE
            posts.post_snowflake = $1
        ",
    )
    .bind(bigint(id))
    .fetch_optional(conn)
    .await?;

    let post = record.map(Post::try_from).transpose()?;
    Ok(post)
}

async fn attach_images(
    conn: &mut PgConnection,
    records: Vec<PostDetailsRecord>,
    weights: &ActivityWeights,
) -> Result<Vec<PostWithActivity>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = records.iter().map(|record| record.post.post_snowflake).collect();
    let image_records = query_as::<_, ImageRecord>(
        "
        SELECT images.image_snowflake, images.post_snowflake, images.url
        FROM posts.images
        WHERE images.post_snowflake = ANY($1)
        ORDER BY images.image_snowflake
        ",
    )
    .bind(ids)
    .fetch_all(conn)
    .await?;

    let mut images: HashMap<PostId, Vec<PostImage>> = HashMap::new();
    for record in image_records {
        let image = PostImage::try_from(record)?;
        images.entry(image.post_id).or_default().push(image);
    }

    records
        .into_iter()
        .map(|record| -> Result<PostWithActivity> {
            let mut details = record.into_details(weights)?;
            details.images = images.remove(&details.post.id).unwrap_or_default();
            Ok(details)
        })
        .collect()
}

pub(crate) async fn fetch_post_details(
    conn: &mut PgConnection,
    id: PostId,
    weights: &ActivityWeights,
) -> Result<Option<PostWithActivity>> {
    let record = query_as::<_, PostDetailsRecord>(post_details!("WHERE posts.post_snowflake = $1"))
        .bind(bigint(id))
        .fetch_optional(&mut *conn)
        .await?;

    let details = attach_images(conn, record.into_iter().collect(), weights).await?;
    Ok(details.into_iter().next())
}

pub(crate) async fn fetch_posts(
    conn: &mut PgConnection,
    query: &PostQuery,
) -> Result<Vec<PostWithActivity>> {
    let (limit, offset) = limit_offset(query.page);
    let weights = &query.weights;

    let records = match query.scope {
        PostScope::Feed { viewer } => {
            query_as::<_, PostDetailsRecord>(concat!(
                "SELECT * FROM (",
                post_details!(
                    "
                    WHERE posts.parent_snowflake IS NULL
                        AND graph.can_view($1, posts.account_snowflake)
                    "
                ),
                "
                ) AS ranked
                ORDER BY
                    ranked.likes * $2 + ranked.comments * $3 + ranked.bookmarks * $4 DESC,
                    ranked.created_at DESC,
                    ranked.post_snowflake DESC
                LIMIT $5 OFFSET $6
                "
            ))
            .bind(viewer_param(viewer))
            .bind(i64::from(weights.like))
            .bind(i64::from(weights.comment))
            .bind(i64::from(weights.bookmark))
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?
        }
        PostScope::AuthoredBy(author) => {
            query_as::<_, PostDetailsRecord>(post_details!(
                "
                WHERE posts.account_snowflake = $1 AND posts.parent_snowflake IS NULL
                ORDER BY posts.created_at DESC, posts.post_snowflake DESC
                LIMIT $2 OFFSET $3
                "
            ))
            .bind(bigint(author))
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?
        }
        PostScope::LikedBy { account, viewer } => {
            query_as::<_, PostDetailsRecord>(post_details!(
                "
                JOIN engagement.likes AS related ON related.subject_snowflake = posts.post_snowflake
                WHERE related.actor_snowflake = $1
                    AND graph.can_view($2, posts.account_snowflake)
                ORDER BY related.created_at DESC, posts.post_snowflake DESC
                LIMIT $3 OFFSET $4
                "
            ))
            .bind(bigint(account))
            .bind(viewer_param(viewer))
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?
        }
        PostScope::BookmarkedBy { account, viewer } => {
            query_as::<_, PostDetailsRecord>(post_details!(
                "
                JOIN engagement.bookmarks AS related
                    ON related.subject_snowflake = posts.post_snowflake
                WHERE related.actor_snowflake = $1
                    AND graph.can_view($2, posts.account_snowflake)
                ORDER BY related.created_at DESC, posts.post_snowflake DESC
                LIMIT $3 OFFSET $4
                "
            ))
            .bind(bigint(account))
            .bind(viewer_param(viewer))
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?
        }
        PostScope::CommentsOf(parent) => {
            query_as::<_, PostDetailsRecord>(post_details!(
                "
                WHERE posts.parent_snowflake = $1
                ORDER BY posts.created_at DESC, posts.post_snowflake DESC
                LIMIT $2 OFFSET $3
                "
            ))
            .bind(bigint(parent))
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?
        }
    };

    attach_images(conn, records, weights).await
}

pub(crate) async fn count_posts(conn: &mut PgConnection, scope: PostScope) -> Result<u64> {
    let total = match scope {
        PostScope::Feed { viewer } => {
            query_scalar::<_, i64>(
                "
                SELECT COUNT(*) FROM posts.posts
                WHERE posts.parent_snowflake IS NULL
                    AND graph.can_view($1, posts.account_snowflake)
                ",
            )
            .bind(viewer_param(viewer))
            .fetch_one(conn)
            .await?
        }
        PostScope::AuthoredBy(author) => {
            query_scalar::<_, i64>(
                "
                SELECT COUNT(*) FROM posts.posts
                WHERE posts.account_snowflake = $1 AND posts.parent_snowflake IS NULL
                ",
            )
            .bind(bigint(author))
            .fetch_one(conn)
            .await?
        }
        PostScope::LikedBy { account, viewer } => {
            query_scalar::<_, i64>(
                "
                SELECT COUNT(*)
                FROM engagement.likes
                    JOIN posts.posts ON posts.post_snowflake = likes.subject_snowflake
                WHERE likes.actor_snowflake = $1
                    AND graph.can_view($2, posts.account_snowflake)
                ",
            )
            .bind(bigint(account))
            .bind(viewer_param(viewer))
            .fetch_one(conn)
            .await?
        }
        PostScope::BookmarkedBy { account, viewer } => {
            query_scalar::<_, i64>(
                "
                SELECT COUNT(*)
                FROM engagement.bookmarks
                    JOIN posts.posts ON posts.post_snowflake = bookmarks.subject_snowflake
                WHERE bookmarks.actor_snowflake = $1
                    AND graph.can_view($2, posts.account_snowflake)
                ",
            )
            .bind(bigint(account))
            .bind(viewer_param(viewer))
            .fetch_one(conn)
            .await?
        }
        PostScope::CommentsOf(parent) => {
            query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM posts.posts WHERE posts.parent_snowflake = $1",
            )
            .bind(bigint(parent))
            .fetch_one(conn)
            .await?
        }
    };

    Ok(count(total))
}

pub(crate) async fn create_post(
    conn: &mut PgConnection,
    id: PostId,
    image_ids: Vec<Id<PostImageMarker>>,
    created_at: UtcDateTime,
    post: CreatePost,
) -> Result<(Post, Vec<PostImage>)> {
    let record = query_as::<_, PostRecord>(
        "
        INSERT INTO posts.posts
            (post_snowflake, account_snowflake, parent_snowflake, content, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING post_snowflake, account_snowflake, parent_snowflake, content, created_at
        ",
    )
    .bind(bigint(id))
    .bind(bigint(post.author))
    .bind(post.parent.map(bigint))
    .bind(post.content.get())
    .bind(primitive(created_at))
    .fetch_one(&mut *conn)
    .await?;
    let created = Post::try_from(record)?;

    let mut images = Vec::new();
    for (image_id, url) in image_ids.into_iter().zip(post.image_urls.into_inner()) {
        let record = query_as::<_, ImageRecord>(
            "
            INSERT INTO posts.images (image_snowflake, post_snowflake, url)
            VALUES ($1, $2, $3)
            RETURNING image_snowflake, post_snowflake, url
            ",
        )
        .bind(bigint(image_id))
        .bind(bigint(created.id))
        .bind(url.get())
        .fetch_one(&mut *conn)
        .await?;
        images.push(PostImage::try_from(record)?);
    }

    Ok((created, images))
}

/// Images, engagement and notifications go with the posts through cascading foreign keys.
pub(crate) async fn delete_post(conn: &mut PgConnection, id: PostId) -> Result<u64> {
    let result = query(
        "
        WITH RECURSIVE doomed AS (
            SELECT posts.post_snowflake FROM posts.posts WHERE posts.post_snowflake = $1
            UNION
            SELECT comments.post_snowflake
            FROM posts.posts AS comments
                JOIN doomed ON comments.parent_snowflake = doomed.post_snowflake
        )
        DELETE FROM posts.posts
        WHERE posts.post_snowflake IN (SELECT doomed.post_snowflake FROM doomed)
        ",
    )
    .bind(bigint(id))
    .execute(conn)
    .await?;

    Ok(result.rows_affected())
}

pub(crate) async fn fetch_accounts(
    conn: &mut PgConnection,
    scope: AccountScope,
    page: PageRequest,
) -> Result<Vec<Account>> {
    let (table, listed, anchor) = account_listing(scope);
    let (limit, offset) = limit_offset(page);
    let sql = format!(
        "
        SELECT {ACCOUNT_COLUMNS}
        FROM {table} AS relations
            JOIN accounts.accounts ON accounts.account_snowflake = relations.{listed}
        WHERE relations.{anchor} = $1
        ORDER BY relations.created_at DESC, relations.{listed} DESC
        LIMIT $2 OFFSET $3
        "
    );
    let records = query_as::<_, AccountRecord>(&sql)
        .bind(scope_anchor(scope))
        .bind(limit)
        .bind(offset)
        .fetch_all(conn)
        .await?;

    let accounts = records
        .into_iter()
        .map(Account::try_from)
        .collect::<Result<_, _>>()?;
    Ok(accounts)
}

pub(crate) async fn count_accounts(conn: &mut PgConnection, scope: AccountScope) -> Result<u64> {
    let (table, _, anchor) = account_listing(scope);
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE {anchor} = $1");
    let total = query_scalar::<_, i64>(&sql)
        .bind(scope_anchor(scope))
        .fetch_one(conn)
        .await?;

    Ok(count(total))
}

/// The relation table, the column holding the listed accounts and the column holding the
/// anchor.
fn account_listing(scope: AccountScope) -> (&'static str, &'static str, &'static str) {
    const ACTOR: &str = "actor_snowflake";
    const SUBJECT: &str = "subject_snowflake";

    let (kind, listed, anchor) = match scope {
        AccountScope::FollowersOf(_) => (RelationKind::Follow, ACTOR, SUBJECT),
        AccountScope::FollowingsOf(_) => (RelationKind::Follow, SUBJECT, ACTOR),
        AccountScope::RequestSendersTo(_) => (RelationKind::FollowRequest, ACTOR, SUBJECT),
        AccountScope::RequestReceiversFrom(_) => (RelationKind::FollowRequest, SUBJECT, ACTOR),
        AccountScope::LikersOf(_) => (RelationKind::Like, ACTOR, SUBJECT),
        AccountScope::BookmarkersOf(_) => (RelationKind::Bookmark, ACTOR, SUBJECT),
    };
    (relation_table(kind), listed, anchor)
}

fn scope_anchor(scope: AccountScope) -> i64 {
    match scope {
        AccountScope::FollowersOf(id)
        | AccountScope::FollowingsOf(id)
        | AccountScope::RequestSendersTo(id)
        | AccountScope::RequestReceiversFrom(id) => bigint(id),
        AccountScope::LikersOf(post) | AccountScope::BookmarkersOf(post) => bigint(post),
    }
}

/// Active accounts whose handle contains the search text, most followed first.
pub(crate) async fn search_accounts(
    conn: &mut PgConnection,
    search: &HandleSearch,
    page: PageRequest,
) -> Result<Vec<Account>> {
    let (limit, offset) = limit_offset(page);
    let sql = format!(
        "
        SELECT {ACCOUNT_COLUMNS}
        FROM accounts.accounts
        WHERE accounts.is_active AND accounts.handle ILIKE $1
        ORDER BY
            (
                SELECT COUNT(*) FROM graph.follows
                WHERE follows.subject_snowflake = accounts.account_snowflake
            ) DESC,
            accounts.created_at DESC,
            accounts.account_snowflake DESC
        LIMIT $2 OFFSET $3
        "
    );
    let records = query_as::<_, AccountRecord>(&sql)
        .bind(search.like_pattern())
        .bind(limit)
        .bind(offset)
        .fetch_all(conn)
        .await?;

    let accounts = records
        .into_iter()
        .map(Account::try_from)
        .collect::<Result<_, _>>()?;
    Ok(accounts)
}

pub(crate) async fn count_search_accounts(
    conn: &mut PgConnection,
    search: &HandleSearch,
) -> Result<u64> {
    let total = query_scalar::<_, i64>(
        "
        SELECT COUNT(*) FROM accounts.accounts
        WHERE accounts.is_active AND accounts.handle ILIKE $1
        ",
    )
    .bind(search.like_pattern())
    .fetch_one(conn)
    .await?;

    Ok(count(total))
}

pub(crate) async fn fetch_notifications(
    conn: &mut PgConnection,
    recipient: AccountId,
    page: PageRequest,
) -> Result<Vec<NotificationWithActor>> {
    let (limit, offset) = limit_offset(page);
    let sql = format!(
        "
        SELECT
            {NOTIFICATION_COLUMNS},
            actors.handle AS actor_handle,
            actors.is_public AS actor_is_public,
            actors.is_active AS actor_is_active,
            actors.created_at AS actor_created_at
        FROM
            notifications.notifications
            JOIN accounts.accounts AS actors
                ON actors.account_snowflake = notifications.actor_snowflake
        WHERE
            notifications.recipient_snowflake = $1
        ORDER BY notifications.created_at DESC, notifications.notification_snowflake DESC
        LIMIT $2 OFFSET $3
        "
    );
    let records = query_as::<_, NotificationWithActorRecord>(&sql)
        .bind(bigint(recipient))
        .bind(limit)
        .bind(offset)
        .fetch_all(conn)
        .await?;

    let notifications = records
        .into_iter()
        .map(NotificationWithActor::try_from)
        .collect::<Result<_, _>>()?;
    Ok(notifications)
}

pub(crate) async fn count_notifications(
    conn: &mut PgConnection,
    recipient: AccountId,
) -> Result<u64> {
    let total = query_scalar::<_, i64>(
        "
        SELECT COUNT(*) FROM notifications.notifications
        WHERE notifications.recipient_snowflake = $1
        ",
    )
    .bind(bigint(recipient))
    .fetch_one(conn)
    .await?;

    Ok(count(total))
}

pub(crate) async fn find_notification(
    conn: &mut PgConnection,
    key: NotificationKey,
) -> Result<Option<Notification>> {
    let sql = format!(
        "
        SELECT {NOTIFICATION_COLUMNS}
        FROM notifications.notifications
        WHERE notifications.actor_snowflake = $1
            AND notifications.post_snowflake = $2
            AND notifications.kind = $3
        "
    );
    let record = query_as::<_, NotificationRecord>(&sql)
        .bind(bigint(key.actor))
        .bind(bigint(key.post))
        .bind(key.kind.as_str())
        .fetch_optional(conn)
        .await?;

    let notification = record.map(Notification::try_from).transpose()?;
    Ok(notification)
}

pub(crate) async fn refresh_notification(
    conn: &mut PgConnection,
    id: Id<NotificationMarker>,
    now: UtcDateTime,
) -> Result<Option<Notification>> {
    let sql = format!(
        "
        UPDATE notifications.notifications
        SET created_at = $2
        WHERE notifications.notification_snowflake = $1
        RETURNING {NOTIFICATION_COLUMNS}
        "
    );
    let record = query_as::<_, NotificationRecord>(&sql)
        .bind(bigint(id))
        .bind(primitive(now))
        .fetch_optional(conn)
        .await?;

    let notification = record.map(Notification::try_from).transpose()?;
    Ok(notification)
}

pub(crate) async fn insert_notification(
    conn: &mut PgConnection,
    id: Id<NotificationMarker>,
    created_at: UtcDateTime,
    notification: NewNotification,
) -> Result<Notification> {
    let sql = format!(
        "
        INSERT INTO notifications.notifications
            (notification_snowflake, recipient_snowflake, actor_snowflake, kind,
             post_snowflake, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {NOTIFICATION_COLUMNS}
        "
    );
    let record = query_as::<_, NotificationRecord>(&sql)
        .bind(bigint(id))
        .bind(bigint(notification.recipient))
        .bind(bigint(notification.key.actor))
        .bind(notification.key.kind.as_str())
        .bind(bigint(notification.key.post))
        .bind(primitive(created_at))
        .fetch_one(conn)
        .await?;

    Ok(record.try_into()?)
}

pub(crate) async fn relation_exists(conn: &mut PgConnection, key: RelationKey) -> Result<bool> {
    Ok(fetch_relation(conn, key).await?.is_some())
}
