//! Create-or-remove over pair-keyed relations.

use crate::{
    error::{CoreError, PreconditionError, Result},
    store::{AccountId, Transaction},
    viewer::Viewer,
    visibility::can_view_in,
};
use agora_common::model::{
    Id,
    account::AccountMarker,
    post::PostMarker,
    relation::{Relation, RelationKey, RelationKind},
};
use serde::Serialize;
use tracing::debug;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Toggle {
    Created(Relation),
    Removed,
}

impl Toggle {
    #[must_use]
    pub fn created(&self) -> Option<&Relation> {
        match self {
            Toggle::Created(relation) => Some(relation),
            Toggle::Removed => None,
        }
    }
}

/// A relation kind the toggle engine can flip.
pub trait PairRelation {
    /// What the actor relates to.
    type Subject: Copy + Send + Sync;

    const KIND: RelationKind;

    /// Runs while the pair is locked and before a missing relation is inserted.
    /// Removal is never gated.
    fn ensure_creatable(
        tx: &mut dyn Transaction,
        actor: AccountId,
        subject: Id<Self::Subject>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Runs in the same transaction right after the relation was inserted.
    fn created(
        _tx: &mut dyn Transaction,
        _actor: AccountId,
        _subject: Id<Self::Subject>,
    ) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

pub struct Like;
pub struct Bookmark;
pub struct Follow;
pub struct FollowRequest;

async fn ensure_post_visible(
    tx: &mut dyn Transaction,
    actor: AccountId,
    post: Id<PostMarker>,
) -> Result<()> {
    let post = tx
        .fetch_post(post)
        .await?
        .ok_or(CoreError::PostNotFound(post))?;
    let author = tx
        .fetch_account(post.author_id)
        .await?
        .ok_or(CoreError::AccountNotFound(post.author_id))?;

    if can_view_in(tx, Viewer::Account(actor), &author).await? {
        Ok(())
    } else {
        Err(CoreError::Forbidden)
    }
}

impl PairRelation for Like {
    type Subject = PostMarker;
    const KIND: RelationKind = RelationKind::Like;

    async fn ensure_creatable(
        tx: &mut dyn Transaction,
        actor: AccountId,
        subject: Id<PostMarker>,
    ) -> Result<()> {
        ensure_post_visible(tx, actor, subject).await
    }
}

impl PairRelation for Bookmark {
    type Subject = PostMarker;
    const KIND: RelationKind = RelationKind::Bookmark;

    async fn ensure_creatable(
        tx: &mut dyn Transaction,
        actor: AccountId,
        subject: Id<PostMarker>,
    ) -> Result<()> {
        ensure_post_visible(tx, actor, subject).await
    }
}

impl PairRelation for Follow {
    type Subject = AccountMarker;
    const KIND: RelationKind = RelationKind::Follow;

    async fn ensure_creatable(
        tx: &mut dyn Transaction,
        _actor: AccountId,
        subject: AccountId,
    ) -> Result<()> {
        let target = tx
            .fetch_account(subject)
            .await?
            .ok_or(CoreError::AccountNotFound(subject))?;
        if !target.is_public {
            return Err(PreconditionError::TargetPrivate.into());
        }
        Ok(())
    }

    /// A request left over from when the target was private is settled by the follow.
    async fn created(tx: &mut dyn Transaction, actor: AccountId, subject: AccountId) -> Result<()> {
        let request = RelationKey::new(RelationKind::FollowRequest, actor, subject.snowflake());
        if tx.delete_relation(request).await? > 0 {
            debug!(%actor, %subject, "Dropped pending follow request");
        }
        Ok(())
    }
}

impl PairRelation for FollowRequest {
    type Subject = AccountMarker;
    const KIND: RelationKind = RelationKind::FollowRequest;

    async fn ensure_creatable(
        tx: &mut dyn Transaction,
        actor: AccountId,
        subject: AccountId,
    ) -> Result<()> {
        let target = tx
            .fetch_account(subject)
            .await?
            .ok_or(CoreError::AccountNotFound(subject))?;
        if target.is_public {
            return Err(PreconditionError::TargetPublic.into());
        }

        let follow = RelationKey::new(RelationKind::Follow, actor, subject.snowflake());
        if tx.fetch_relation(follow).await?.is_some() {
            return Err(PreconditionError::AlreadyFollowing.into());
        }
        Ok(())
    }
}

/// Creates the relation if it is absent and removes it otherwise.
///
/// The pair stays locked until `tx` ends, so concurrent togglers of the same pair
/// observe each other's results.
pub async fn toggle<R: PairRelation>(
    tx: &mut dyn Transaction,
    actor: AccountId,
    subject: Id<R::Subject>,
) -> Result<Toggle> {
    let account_pair = matches!(R::KIND, RelationKind::Follow | RelationKind::FollowRequest);
    if account_pair && actor.get() == subject.get() {
        return Err(PreconditionError::SelfRelation(R::KIND).into());
    }

    let key = RelationKey::new(R::KIND, actor, subject.snowflake());
    tx.lock_pair(&key).await?;

    if tx.fetch_relation(key).await?.is_some() {
        let affected = tx.delete_relation(key).await?;
        if affected != 1 {
            return Err(CoreError::IntegrityViolation {
                kind: R::KIND,
                affected,
            });
        }
        debug!(kind = %R::KIND, %actor, subject = %subject, "Removed relation");
        return Ok(Toggle::Removed);
    }

    R::ensure_creatable(tx, actor, subject).await?;
    let relation = tx.insert_relation(key).await?;
    R::created(tx, actor, subject).await?;
    debug!(kind = %R::KIND, %actor, subject = %subject, "Created relation");
    Ok(Toggle::Created(relation))
}

#[cfg(test)]
mod tests {
    use crate::{
        error::{CoreError, PreconditionError},
        store::Store,
        testing::Fixture,
        toggle::Toggle,
    };
    use agora_common::model::relation::{RelationKey, RelationKind};

    #[tokio::test]
    async fn like_alternates() {
        let fixture = Fixture::new();
        let author = fixture.account("author", true).await;
        let fan = fixture.account("fan", true).await;
        let post = fixture.post(&author, "hello").await;
        let key = RelationKey::new(RelationKind::Like, fan.id, post.snowflake());

        let first = fixture.social.like(fan.id, post).await.unwrap();
        let created = first.created().unwrap();
        assert_eq!(created.key(), key);
        assert!(fixture.store.relation_exists(key).await.unwrap());

        assert_eq!(fixture.social.like(fan.id, post).await.unwrap(), Toggle::Removed);
        assert!(!fixture.store.relation_exists(key).await.unwrap());

        assert!(matches!(
            fixture.social.like(fan.id, post).await.unwrap(),
            Toggle::Created(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_togglers_alternate() {
        let fixture = Fixture::new();
        let author = fixture.account("author", true).await;
        let fan = fixture.account("fan", true).await;
        let post = fixture.post(&author, "contended").await;
        let fan_id = fan.id;

        let tasks: Vec<_> = (0..9)
            .map(|_| {
                let social = fixture.social.clone();
                tokio::spawn(async move { social.bookmark(fan_id, post).await })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            if let Toggle::Created(_) = task.await.unwrap().unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 5);
        let key = RelationKey::new(RelationKind::Bookmark, fan.id, post.snowflake());
        assert!(fixture.store.relation_exists(key).await.unwrap());
    }

    #[tokio::test]
    async fn self_relations_are_rejected() {
        let fixture = Fixture::new();
        let account = fixture.account("narcissus", false).await;

        assert!(matches!(
            fixture.social.follow(account.id, account.id).await,
            Err(CoreError::Precondition(PreconditionError::SelfRelation(
                RelationKind::Follow
            )))
        ));
        assert!(matches!(
            fixture.social.follow_request(account.id, account.id).await,
            Err(CoreError::Precondition(PreconditionError::SelfRelation(
                RelationKind::FollowRequest
            )))
        ));
    }

    #[tokio::test]
    async fn private_accounts_cannot_be_followed_directly() {
        let fixture = Fixture::new();
        let follower = fixture.account("follower", true).await;
        let private = fixture.account("private", false).await;

        assert!(matches!(
            fixture.social.follow(follower.id, private.id).await,
            Err(CoreError::Precondition(PreconditionError::TargetPrivate))
        ));
    }

    #[tokio::test]
    async fn unfollow_is_always_allowed() {
        let fixture = Fixture::new();
        let follower = fixture.account("follower", true).await;
        let target = fixture.account("target", true).await;

        assert!(matches!(
            fixture.social.follow(follower.id, target.id).await,
            Ok(Toggle::Created(_))
        ));
        fixture
            .social
            .update_account(target.id, None, Some(false))
            .await
            .unwrap();

        assert_eq!(
            fixture.social.follow(follower.id, target.id).await.unwrap(),
            Toggle::Removed
        );
    }

    #[tokio::test]
    async fn following_settles_a_pending_request() {
        let fixture = Fixture::new();
        let follower = fixture.account("follower", true).await;
        let target = fixture.account("target", false).await;
        let request = RelationKey::new(
            RelationKind::FollowRequest,
            follower.id,
            target.id.snowflake(),
        );
        let follow = RelationKey::new(RelationKind::Follow, follower.id, target.id.snowflake());

        fixture
            .social
            .follow_request(follower.id, target.id)
            .await
            .unwrap();
        fixture
            .social
            .update_account(target.id, None, Some(true))
            .await
            .unwrap();
        assert!(matches!(
            fixture.social.follow(follower.id, target.id).await,
            Ok(Toggle::Created(_))
        ));

        assert!(fixture.store.relation_exists(follow).await.unwrap());
        assert!(!fixture.store.relation_exists(request).await.unwrap());
    }

    #[tokio::test]
    async fn engagement_needs_an_existing_visible_post() {
        let fixture = Fixture::new();
        let stranger = fixture.account("stranger", true).await;
        let private = fixture.account("private", false).await;
        let hidden = fixture.post(&private, "members only").await;

        assert!(matches!(
            fixture.social.like(stranger.id, hidden).await,
            Err(CoreError::Forbidden)
        ));
        assert!(matches!(
            fixture.social.bookmark(stranger.id, hidden).await,
            Err(CoreError::Forbidden)
        ));

        fixture.social.delete_post(private.id, hidden).await.unwrap();
        assert!(matches!(
            fixture.social.like(private.id, hidden).await,
            Err(CoreError::PostNotFound(id)) if id == hidden
        ));
    }

    #[test]
    fn toggle_serializes_with_status() {
        assert_eq!(
            serde_json::to_value(Toggle::Removed).unwrap(),
            serde_json::json!({ "status": "removed" })
        );
    }
}
