//! Freshness classification of cache entries

use chrono::{DateTime, Utc};

use super::storage::CacheEntry;

/// How a stored entry relates to the current time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No entry stored
    Miss,
    /// Entry present and not yet expired
    Hit,
    /// Entry present but expired; still usable as a fallback
    Stale,
}

/// Classify an entry (or its absence) at `now`.
pub fn classify(entry: Option<&CacheEntry>, now: DateTime<Utc>) -> Freshness {
    match entry {
        None => Freshness::Miss,
        Some(entry) if now >= entry.expires_at => Freshness::Stale,
        Some(_) => Freshness::Hit,
    }
}
