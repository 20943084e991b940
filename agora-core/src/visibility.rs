//! Who may see an account's content.

use crate::{
    error::{CoreError, Result},
    store::{Store, StoreError, Transaction},
    viewer::Viewer,
};
use agora_common::model::{
    account::Account,
    relation::{RelationKey, RelationKind},
};

/// The outcome of checking a viewer against an account, before any lookup.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum Visibility {
    Granted,
    Denied,
    /// Granted iff this follow edge exists.
    IfFollowing(RelationKey),
}

/// Public accounts are visible to everyone, every account to itself, and private
/// accounts to their followers. Guests only ever see public accounts.
#[must_use]
pub fn visibility(viewer: Viewer, target: &Account) -> Visibility {
    if target.is_public || viewer.is(target.id) {
        return Visibility::Granted;
    }
    match viewer {
        Viewer::Guest => Visibility::Denied,
        Viewer::Account(id) => Visibility::IfFollowing(RelationKey::new(
            RelationKind::Follow,
            id,
            target.id.snowflake(),
        )),
    }
}

pub async fn can_view(
    store: &dyn Store,
    viewer: Viewer,
    target: &Account,
) -> Result<bool, StoreError> {
    match visibility(viewer, target) {
        Visibility::Granted => Ok(true),
        Visibility::Denied => Ok(false),
        Visibility::IfFollowing(key) => store.relation_exists(key).await,
    }
}

/// Like [`can_view`], reading through an open transaction.
pub async fn can_view_in(
    tx: &mut dyn Transaction,
    viewer: Viewer,
    target: &Account,
) -> Result<bool, StoreError> {
    match visibility(viewer, target) {
        Visibility::Granted => Ok(true),
        Visibility::Denied => Ok(false),
        Visibility::IfFollowing(key) => Ok(tx.fetch_relation(key).await?.is_some()),
    }
}

pub async fn ensure_can_view(store: &dyn Store, viewer: Viewer, target: &Account) -> Result<()> {
    if can_view(store, viewer, target).await? {
        Ok(())
    } else {
        Err(CoreError::Forbidden)
    }
}
