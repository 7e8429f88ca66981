//! Data-freshness cache for market data
//!
//! A SQLite-backed store fronts every remote data source. Each entry belongs
//! to a [`Category`] whose TTL is fixed when the store is opened. The
//! [`FetchCoordinator`] is the only writer and guarantees at most one
//! producer execution per key at any instant.

pub mod coordinator;
pub mod flight;
pub mod freshness;
pub mod key;
pub mod maintenance;
pub mod storage;

use std::fmt;
use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Class of cached data. Drives TTL and invalidation scope.
///
/// Forecasts are deliberately not a category: they are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fundamentals,
    History,
    News,
    Indices,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Fundamentals,
        Category::History,
        Category::News,
        Category::Indices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fundamentals => "fundamentals",
            Category::History => "history",
            Category::News => "news",
            Category::Indices => "indices",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CacheError::UnknownScope(s.to_string()))
    }
}

/// Cache TTL configuration per data category
pub struct CacheTtl;

impl CacheTtl {
    // Company fundamentals move slowly
    pub const FUNDAMENTALS: TimeDelta = TimeDelta::hours(24);
    pub const NEWS: TimeDelta = TimeDelta::hours(12);
    // Daily bars, refreshed a few times per trading day
    pub const HISTORY: TimeDelta = TimeDelta::hours(6);
    // Index quotes are near-real-time
    pub const INDICES: TimeDelta = TimeDelta::minutes(5);
}

/// Immutable category → TTL mapping held by the store.
///
/// Zero or negative TTLs are legal and make every entry of that category
/// STALE on read, forcing a refresh attempt on each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    fundamentals: TimeDelta,
    history: TimeDelta,
    news: TimeDelta,
    indices: TimeDelta,
}

impl TtlPolicy {
    /// The production policy table
    pub const fn standard() -> Self {
        Self {
            fundamentals: CacheTtl::FUNDAMENTALS,
            history: CacheTtl::HISTORY,
            news: CacheTtl::NEWS,
            indices: CacheTtl::INDICES,
        }
    }

    /// Return a copy of this policy with one category's TTL replaced.
    pub fn with_ttl(mut self, category: Category, ttl: TimeDelta) -> Self {
        match category {
            Category::Fundamentals => self.fundamentals = ttl,
            Category::History => self.history = ttl,
            Category::News => self.news = ttl,
            Category::Indices => self.indices = ttl,
        }
        self
    }

    pub fn ttl(&self, category: Category) -> TimeDelta {
        match category {
            Category::Fundamentals => self.fundamentals,
            Category::History => self.history,
            Category::News => self.news,
            Category::Indices => self.indices,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

// Re-export main types
pub use coordinator::{Cached, FetchCoordinator, Fetched, Provenance};
pub use flight::SingleFlight;
pub use freshness::{Freshness, classify};
pub use key::{MARKET_KEY, company_news_key, history_key, normalize_symbol};
pub use maintenance::{BATCH_SIZE, InvalidateScope};
pub use storage::{CacheEntry, CacheStats, CacheStorage};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_policy_table() {
        let policy = TtlPolicy::standard();
        assert_eq!(policy.ttl(Category::Fundamentals), TimeDelta::hours(24));
        assert_eq!(policy.ttl(Category::News), TimeDelta::hours(12));
        assert_eq!(policy.ttl(Category::History), TimeDelta::hours(6));
        assert_eq!(policy.ttl(Category::Indices), TimeDelta::minutes(5));
    }

    #[test]
    fn test_with_ttl_only_touches_one_category() {
        let policy = TtlPolicy::standard().with_ttl(Category::News, TimeDelta::zero());
        assert_eq!(policy.ttl(Category::News), TimeDelta::zero());
        assert_eq!(policy.ttl(Category::History), CacheTtl::HISTORY);
    }

    #[test]
    fn test_category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!("NEWS".parse::<Category>().unwrap(), Category::News);
        assert!("prediction".parse::<Category>().is_err());
    }
}
