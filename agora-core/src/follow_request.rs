//! Pending follow requests and their resolution into follow edges.

use crate::{
    error::{CoreError, Result},
    store::{AccountId, Transaction},
    toggle::{FollowRequest, Toggle, toggle},
};
use agora_common::model::relation::{Relation, RelationKey, RelationKind};
use tracing::debug;

/// Sends a request, or cancels the one already pending.
pub async fn request(
    tx: &mut dyn Transaction,
    sender: AccountId,
    receiver: AccountId,
) -> Result<Toggle> {
    toggle::<FollowRequest>(tx, sender, receiver).await
}

/// Turns the pending request of `sender` into a follow edge towards `receiver`.
pub async fn accept(
    tx: &mut dyn Transaction,
    receiver: AccountId,
    sender: AccountId,
) -> Result<Relation> {
    let request_key = RelationKey::new(RelationKind::FollowRequest, sender, receiver.snowflake());
    let follow_key = RelationKey::new(RelationKind::Follow, sender, receiver.snowflake());
    tx.lock_pair(&request_key).await?;

    if tx.fetch_relation(request_key).await?.is_none() {
        return Err(CoreError::FollowRequestNotFound { sender, receiver });
    }

    let follow = match tx.fetch_relation(follow_key).await? {
        Some(existing) => existing,
        None => tx.insert_relation(follow_key).await?,
    };

    let affected = tx.delete_relation(request_key).await?;
    if affected != 1 {
        return Err(CoreError::IntegrityViolation {
            kind: RelationKind::FollowRequest,
            affected,
        });
    }

    debug!(%sender, %receiver, "Accepted follow request");
    Ok(follow)
}
