use crate::model::{AgoraSnowflake, Id, account::AccountMarker};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use time::UtcDateTime;

/// The pair-keyed relations an account can toggle.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Account likes a post.
    Like,
    /// Account bookmarks a post.
    Bookmark,
    /// Account follows an account.
    Follow,
    /// Account asks to follow a private account.
    FollowRequest,
}

impl RelationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Like => "like",
            RelationKind::Bookmark => "bookmark",
            RelationKind::Follow => "follow",
            RelationKind::FollowRequest => "follow_request",
        }
    }

    /// Follows and follow requests between the same two accounts are mutually exclusive,
    /// so they share one lock namespace.
    #[must_use]
    pub fn lock_namespace(self) -> &'static str {
        match self {
            RelationKind::Like => "like",
            RelationKind::Bookmark => "bookmark",
            RelationKind::Follow | RelationKind::FollowRequest => "graph",
        }
    }
}

impl Display for RelationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one relation row. `subject` is a post for likes and bookmarks and an
/// account otherwise.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct RelationKey {
    pub kind: RelationKind,
    pub actor: Id<AccountMarker>,
    pub subject: AgoraSnowflake,
}

impl RelationKey {
    #[must_use]
    pub fn new(kind: RelationKind, actor: Id<AccountMarker>, subject: AgoraSnowflake) -> Self {
        Self {
            kind,
            actor,
            subject,
        }
    }

    /// The key under which concurrent toggles of this pair are serialized.
    #[must_use]
    pub fn lock_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.kind.lock_namespace(),
            self.actor,
            self.subject
        )
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Relation {
    pub kind: RelationKind,
    pub actor_id: Id<AccountMarker>,
    pub subject_id: AgoraSnowflake,
    #[serde(with = "crate::util::rfc3339")]
    pub created_at: UtcDateTime,
}

impl Relation {
    #[must_use]
    pub fn key(&self) -> RelationKey {
        RelationKey::new(self.kind, self.actor_id, self.subject_id)
    }
}
