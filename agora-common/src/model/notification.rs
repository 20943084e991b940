use crate::model::{
    Id,
    account::{Account, AccountMarker},
    post::PostMarker,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;
use time::UtcDateTime;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct NotificationMarker;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Unknown notification kind: {0:?}")]
pub struct UnknownNotificationKindError(String);

impl NotificationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::Comment => "comment",
        }
    }
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = UnknownNotificationKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(NotificationKind::Like),
            "comment" => Ok(NotificationKind::Comment),
            other => Err(UnknownNotificationKindError(other.to_owned())),
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Notification {
    pub id: Id<NotificationMarker>,
    pub recipient_id: Id<AccountMarker>,
    pub actor_id: Id<AccountMarker>,
    pub kind: NotificationKind,
    pub post_id: Id<PostMarker>,
    #[serde(with = "crate::util::rfc3339")]
    pub created_at: UtcDateTime,
}

/// At most one notification exists per key.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct NotificationKey {
    pub actor: Id<AccountMarker>,
    pub post: Id<PostMarker>,
    pub kind: NotificationKind,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewNotification {
    pub recipient: Id<AccountMarker>,
    pub key: NotificationKey,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct NotificationWithActor {
    #[serde(flatten)]
    pub notification: Notification,
    pub actor: Account,
}

#[cfg(test)]
mod tests {
    use crate::model::notification::NotificationKind;
    use std::str::FromStr;

    #[test]
    fn kind_round_trips_through_text() {
        for kind in [NotificationKind::Like, NotificationKind::Comment] {
            assert_eq!(NotificationKind::from_str(kind.as_str()), Ok(kind));
        }
        assert!(NotificationKind::from_str("follow").is_err());
        assert_eq!(
            serde_json::to_string(&NotificationKind::Comment).unwrap(),
            r#""comment""#
        );
    }
}
