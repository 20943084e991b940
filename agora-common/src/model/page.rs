use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_PAGE_LIMIT: u64 = 100;
pub const DEFAULT_PAGE_LIMIT: u64 = 20;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidPageError {
    #[error("Page must be at least 1, got {0}")]
    Page(i64),
    #[error("Limit must be between 1 and 100, got {0}")]
    Limit(i64),
}

/// A validated 1-based page of `limit` items.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
pub struct PageRequest {
    page: u64,
    limit: u64,
}

impl PageRequest {
    pub fn new(page: i64, limit: i64) -> Result<Self, InvalidPageError> {
        let page = u64::try_from(page)
            .ok()
            .filter(|&page| page > 0)
            .ok_or(InvalidPageError::Page(page))?;
        let checked_limit = u64::try_from(limit)
            .ok()
            .filter(|value| (1..=MAX_PAGE_LIMIT).contains(value))
            .ok_or(InvalidPageError::Limit(limit))?;

        Ok(Self {
            page,
            limit: checked_limit,
        })
    }

    /// Missing values fall back to the first page of [`DEFAULT_PAGE_LIMIT`] items.
    #[allow(clippy::cast_possible_wrap)]
    pub fn from_query(page: Option<i64>, limit: Option<i64>) -> Result<Self, InvalidPageError> {
        Self::new(page.unwrap_or(1), limit.unwrap_or(DEFAULT_PAGE_LIMIT as i64))
    }

    #[must_use]
    pub fn page(self) -> u64 {
        self.page
    }

    #[must_use]
    pub fn limit(self) -> u64 {
        self.limit
    }

    /// Items before this page: `page * limit - limit`.
    #[must_use]
    pub fn skip(self) -> u64 {
        self.page.saturating_mul(self.limit) - self.limit
    }

    #[must_use]
    pub fn total_pages(self, total_items: u64) -> u64 {
        total_items.div_ceil(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_pages: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, request: PageRequest, total_items: u64) -> Self {
        Self {
            items,
            total_pages: request.total_pages(total_items),
        }
    }
}
