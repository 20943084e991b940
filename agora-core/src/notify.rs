//! Deduplicated notifications with a bounded number of attempts.

use crate::{
    error::{CoreError, Result},
    store::{AccountId, StoreError, Transaction},
};
use agora_common::model::notification::{NewNotification, NotificationKey};
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum Delivery {
    /// Actors are never notified about their own activity.
    Skipped,
    Inserted,
    /// An earlier notification with the same key moved to the top.
    Refreshed,
}

/// Ensures exactly one notification exists for `key`, addressed to `recipient`.
///
/// Every attempt runs in its own savepoint of `tx`, so a failed attempt leaves no
/// partial writes behind. Once all attempts failed the caller must abandon `tx`.
pub async fn notify(
    tx: &mut dyn Transaction,
    recipient: AccountId,
    key: NotificationKey,
    policy: RetryPolicy,
) -> Result<Delivery> {
    if recipient == key.actor {
        return Ok(Delivery::Skipped);
    }

    for attempt in 1..=policy.max_attempts {
        match attempt_delivery(tx, recipient, key).await {
            Ok(delivery) => {
                debug!(?delivery, %recipient, post = %key.post, kind = %key.kind, "Notified");
                return Ok(delivery);
            }
            Err(error) => {
                warn!(
                    %error,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "Notification attempt failed"
                );
            }
        }
    }

    Err(CoreError::NotificationFailed {
        attempts: policy.max_attempts,
    })
}

async fn attempt_delivery(
    tx: &mut dyn Transaction,
    recipient: AccountId,
    key: NotificationKey,
) -> Result<Delivery, StoreError> {
    let mut savepoint = tx.savepoint().await?;

    let delivery = match savepoint.find_notification(key).await? {
        Some(existing) => {
            savepoint
                .refresh_notification(existing.id)
                .await?
                .ok_or_else(|| {
                    StoreError::Conflict(format!("notification {} vanished", existing.id))
                })?;
            Delivery::Refreshed
        }
        None => {
            savepoint
                .insert_notification(NewNotification { recipient, key })
                .await?;
            Delivery::Inserted
        }
    };

    savepoint.commit().await?;
    Ok(delivery)
}

#[cfg(test)]
mod tests {
    use crate::{
        error::CoreError,
        notify::RetryPolicy,
        social::SocialConfig,
        store::Store,
        testing::Fixture,
        toggle::Toggle,
    };
    use agora_common::model::{
        notification::NotificationKind,
        page::PageRequest,
        relation::{RelationKey, RelationKind},
    };

    #[tokio::test]
    async fn like_unlike_like_keeps_one_refreshed_notification() {
        let fixture = Fixture::new();
        let author = fixture.account("author", true).await;
        let fan = fixture.account("fan", true).await;
        let post = fixture.post(&author, "notable").await;

        fixture.social.like(fan.id, post).await.unwrap();
        let first = fixture
            .social
            .notifications(author.id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(first.items.len(), 1);
        let original = &first.items[0].notification;
        assert_eq!(original.kind, NotificationKind::Like);
        assert_eq!(original.actor_id, fan.id);
        assert_eq!(original.post_id, post);
        assert_eq!(first.items[0].actor.id, fan.id);

        fixture.social.like(fan.id, post).await.unwrap();
        fixture.social.like(fan.id, post).await.unwrap();

        let after = fixture
            .social
            .notifications(author.id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(after.items.len(), 1);
        assert_eq!(after.total_pages, 1);
        let refreshed = &after.items[0].notification;
        assert_eq!(refreshed.id, original.id);
        assert!(refreshed.created_at >= original.created_at);
    }

    #[tokio::test]
    async fn own_activity_is_not_notified() {
        let fixture = Fixture::new();
        let author = fixture.account("author", true).await;
        let post = fixture.post(&author, "mine").await;

        fixture.social.like(author.id, post).await.unwrap();
        fixture.comment(&author, post, "replying to myself").await;

        let notifications = fixture
            .social
            .notifications(author.id, PageRequest::default())
            .await
            .unwrap();
        assert!(notifications.items.is_empty());
    }

    #[tokio::test]
    async fn repeated_comments_share_a_notification() {
        let fixture = Fixture::new();
        let author = fixture.account("author", true).await;
        let chatty = fixture.account("chatty", true).await;
        let post = fixture.post(&author, "discuss").await;

        fixture.comment(&chatty, post, "first").await;
        fixture.comment(&chatty, post, "second").await;

        let notifications = fixture
            .social
            .notifications(author.id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(notifications.items.len(), 1);
        assert_eq!(
            notifications.items[0].notification.kind,
            NotificationKind::Comment
        );
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let fixture = Fixture::new();
        let author = fixture.account("author", true).await;
        let fan = fixture.account("fan", true).await;
        let post = fixture.post(&author, "flaky").await;

        fixture.store.fail_notification_writes(2);
        assert!(matches!(
            fixture.social.like(fan.id, post).await,
            Ok(Toggle::Created(_))
        ));
        assert_eq!(fixture.store.pending_notification_failures(), 0);

        let notifications = fixture
            .social
            .notifications(author.id, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(notifications.items.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_roll_back_the_like() {
        let fixture = Fixture::new();
        let author = fixture.account("author", true).await;
        let fan = fixture.account("fan", true).await;
        let post = fixture.post(&author, "doomed").await;

        fixture.store.fail_notification_writes(3);
        assert!(matches!(
            fixture.social.like(fan.id, post).await,
            Err(CoreError::NotificationFailed { attempts: 3 })
        ));

        let like = RelationKey::new(RelationKind::Like, fan.id, post.snowflake());
        assert!(!fixture.store.relation_exists(like).await.unwrap());
        let notifications = fixture
            .social
            .notifications(author.id, PageRequest::default())
            .await
            .unwrap();
        assert!(notifications.items.is_empty());
    }

    #[tokio::test]
    async fn zero_attempts_fail_immediately() {
        let fixture = Fixture::with_config(SocialConfig {
            retry: RetryPolicy { max_attempts: 0 },
            ..SocialConfig::default()
        });
        let author = fixture.account("author", true).await;
        let fan = fixture.account("fan", true).await;
        let post = fixture.post(&author, "strict").await;

        assert!(matches!(
            fixture.social.like(fan.id, post).await,
            Err(CoreError::NotificationFailed { attempts: 0 })
        ));
        assert!(matches!(
            fixture
                .social
                .create_comment(fan.id, post, "hi".to_owned(), Vec::new())
                .await,
            Err(CoreError::NotificationFailed { attempts: 0 })
        ));
        let comments = fixture
            .social
            .comments(fan.id.into(), post, PageRequest::default())
            .await
            .unwrap();
        assert!(comments.items.is_empty());
    }
}
