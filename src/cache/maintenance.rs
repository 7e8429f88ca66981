//! Bulk invalidation of cache entries

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use log::info;

use super::Category;
use super::coordinator::FetchCoordinator;
use crate::error::CacheError;

/// Rows deleted per store lock acquisition
pub const BATCH_SIZE: usize = 500;

/// What a cache clear removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateScope {
    /// Every entry of one category, fresh or not
    Category(Category),
    /// Only entries already past their expiry
    Expired,
    All,
}

impl FromStr for InvalidateScope {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "expired" => Ok(InvalidateScope::Expired),
            "all" => Ok(InvalidateScope::All),
            other => other.parse().map(InvalidateScope::Category),
        }
    }
}

impl fmt::Display for InvalidateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidateScope::Category(category) => write!(f, "{}", category),
            InvalidateScope::Expired => f.write_str("expired"),
            InvalidateScope::All => f.write_str("all"),
        }
    }
}

impl FetchCoordinator {
    /// Remove the entries selected by `scope` and return how many went.
    ///
    /// Deletes in batches of [`BATCH_SIZE`], re-taking the store lock for
    /// each batch so concurrent fetches interleave. The in-flight registry
    /// is never touched. Without a store there is nothing to remove.
    pub fn invalidate(&self, scope: &InvalidateScope) -> Result<usize, CacheError> {
        let now = Utc::now();
        let mut total = 0;

        loop {
            let removed =
                match self.with_store(|s| s.delete_matching(scope, now, Some(BATCH_SIZE))) {
                    Some(result) => result?,
                    None => return Ok(0),
                };
            total += removed;
            if removed < BATCH_SIZE {
                break;
            }
        }

        info!("Invalidated {} cache entries (scope: {})", total, scope);
        Ok(total)
    }
}
