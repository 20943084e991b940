use crate::model::{Id, auth::PasswordHashString};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use thiserror::Error;
use time::UtcDateTime;

pub const ACCOUNT_HANDLE_MIN_LEN: usize = 3;
pub const ACCOUNT_HANDLE_MAX_LEN: usize = 50;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AccountMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Account {
    pub id: Id<AccountMarker>,
    pub handle: AccountHandle,
    pub is_public: bool,
    pub is_active: bool,
    #[serde(with = "crate::util::rfc3339")]
    pub created_at: UtcDateTime,
}

/// An account together with the counts shown on its profile.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct AccountProfile {
    #[serde(flatten)]
    pub account: Account,
    pub post_count: u64,
    pub follower_count: u64,
    pub following_count: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct NewAccount {
    pub handle: AccountHandle,
    pub password_hash: PasswordHashString,
}

/// Changes requested by an account owner. `None` leaves a field untouched.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, Deserialize, Serialize)]
pub struct AccountUpdate {
    #[serde(default)]
    pub handle: Option<AccountHandle>,
    #[serde(default)]
    pub is_public: Option<bool>,
}

impl AccountUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handle.is_none() && self.is_public.is_none()
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct AccountHandle(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The account handle must be between 3 and 50 characters: {0:?}")]
pub struct InvalidAccountHandleError(String);

impl AccountHandle {
    /// Surrounding whitespace is trimmed before the length check.
    pub fn new(handle: String) -> Result<Self, InvalidAccountHandleError> {
        let trimmed = handle.trim();
        let len = trimmed.chars().count();
        if (ACCOUNT_HANDLE_MIN_LEN..=ACCOUNT_HANDLE_MAX_LEN).contains(&len) {
            Ok(AccountHandle(trimmed.to_owned()))
        } else {
            Err(InvalidAccountHandleError(handle))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for AccountHandle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        AccountHandle::new(inner)
            .map_err(|err| Error::invalid_value(Unexpected::Str(&err.0), &"AccountHandle"))
    }
}

/// Text looked for inside account handles, ignoring case.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
#[serde(transparent)]
pub struct HandleSearch(String);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("Search text must be between 1 and 50 characters: {0:?}")]
pub struct InvalidHandleSearchError(String);

impl HandleSearch {
    pub fn new(text: String) -> Result<Self, InvalidHandleSearchError> {
        let trimmed = text.trim();
        let len = trimmed.chars().count();
        if (1..=ACCOUNT_HANDLE_MAX_LEN).contains(&len) {
            Ok(Self(trimmed.to_owned()))
        } else {
            Err(InvalidHandleSearchError(text))
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    /// Whether `handle` contains the search text, ignoring case.
    #[must_use]
    pub fn matches(&self, handle: &AccountHandle) -> bool {
        handle.get().to_lowercase().contains(&self.0.to_lowercase())
    }

    /// A `LIKE` pattern matching the text anywhere, with wildcards in it escaped.
    #[must_use]
    pub fn like_pattern(&self) -> String {
        let mut pattern = String::with_capacity(self.0.len() + 2);
        pattern.push('%');
        for c in self.0.chars() {
            if matches!(c, '%' | '_' | '\\') {
                pattern.push('\\');
            }
            pattern.push(c);
        }
        pattern.push('%');
        pattern
    }
}

#[cfg(test)]
mod tests {
    use crate::model::account::{AccountHandle, AccountUpdate, HandleSearch};

    #[test]
    fn handle_bounds() {
        assert!(AccountHandle::new("ab".to_owned()).is_err());
        assert!(AccountHandle::new("   ab   ".to_owned()).is_err());
        assert_eq!(
            AccountHandle::new("  alice ".to_owned()).unwrap().get(),
            "alice"
        );
        assert!(AccountHandle::new("x".repeat(50)).is_ok());
        assert!(AccountHandle::new("x".repeat(51)).is_err());
        assert!(AccountHandle::new("ééé".to_owned()).is_ok());
    }

    #[test]
    fn handle_deserialization_validates() {
        assert!(serde_json::from_str::<AccountHandle>(r#""bob""#).is_ok());
        assert!(serde_json::from_str::<AccountHandle>(r#""b""#).is_err());
    }

    #[test]
    fn partial_update() {
        let update: AccountUpdate = serde_json::from_str(r#"{"is_public":false}"#).unwrap();
        assert_eq!(update.handle, None);
        assert_eq!(update.is_public, Some(false));
        assert!(!update.is_empty());
        assert!(AccountUpdate::default().is_empty());
    }

    #[test]
    fn handle_search() {
        assert!(HandleSearch::new("   ".to_owned()).is_err());
        assert!(HandleSearch::new("x".repeat(51)).is_err());

        let search = HandleSearch::new(" Li ".to_owned()).unwrap();
        assert!(search.matches(&AccountHandle::new("alice".to_owned()).unwrap()));
        assert!(!search.matches(&AccountHandle::new("bob".to_owned()).unwrap()));
        assert_eq!(search.like_pattern(), "%Li%");
        assert_eq!(
            HandleSearch::new("50%_off".to_owned()).unwrap().like_pattern(),
            r"%50\%\_off%"
        );
    }
}
