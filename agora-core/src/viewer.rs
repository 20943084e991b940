use crate::store::AccountId;

/// Whoever is making a request, resolved once at the boundary.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub enum Viewer {
    #[default]
    Guest,
    Account(AccountId),
}

impl Viewer {
    #[must_use]
    pub fn account(self) -> Option<AccountId> {
        match self {
            Viewer::Guest => None,
            Viewer::Account(id) => Some(id),
        }
    }

    #[must_use]
    pub fn is(self, account: AccountId) -> bool {
        self.account() == Some(account)
    }
}

impl From<AccountId> for Viewer {
    fn from(value: AccountId) -> Self {
        Viewer::Account(value)
    }
}

impl From<Option<AccountId>> for Viewer {
    fn from(value: Option<AccountId>) -> Self {
        value.map_or(Viewer::Guest, Viewer::Account)
    }
}

#[cfg(test)]
mod tests {
    use crate::{store::AccountId, viewer::Viewer};

    #[test]
    fn guests_own_nothing() {
        let account = AccountId::from(5_u64);
        assert_eq!(Viewer::from(None), Viewer::Guest);
        assert!(!Viewer::Guest.is(AccountId::from(0_u64)));
        assert!(Viewer::from(Some(account)).is(account));
        assert_eq!(Viewer::from(account).account(), Some(account));
    }
}
