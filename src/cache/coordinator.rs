//! Fetch coordination over the persistent store
//!
//! Wraps any remote-fetch-or-compute producer with the cache: fresh entries
//! are served directly, stale or missing ones are refreshed through a
//! single-flight slot, and a failed refresh falls back to the last stored
//! value when one exists.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Serialize, de::DeserializeOwned};

use super::flight::SingleFlight;
use super::freshness::{Freshness, classify};
use super::storage::{CacheEntry, CacheStats, CacheStorage};
use super::{Category, TtlPolicy};
use crate::error::{FetchError, Result};

type Store = Arc<Mutex<CacheStorage>>;

/// Where a served value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Fresh entry read from the store
    Cached,
    /// Produced by this request (or the in-flight request it joined)
    Fresh,
    /// Expired entry served because the refresh failed
    Stale,
}

impl Provenance {
    pub fn is_outdated(&self) -> bool {
        matches!(self, Provenance::Stale)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Cached => "cached",
            Provenance::Fresh => "fresh",
            Provenance::Stale => "stale",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw payload returned by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub payload: Vec<u8>,
    pub provenance: Provenance,
    /// When the served value was written to the store, if it was
    pub stored_at: Option<DateTime<Utc>>,
}

impl Fetched {
    fn from_entry(entry: CacheEntry, provenance: Provenance) -> Self {
        Self {
            payload: entry.payload,
            provenance,
            stored_at: Some(entry.created_at),
        }
    }
}

/// Decoded value returned by [`FetchCoordinator::fetch_json`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cached<T> {
    pub value: T,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<DateTime<Utc>>,
}

/// The only writer of the persistent store.
///
/// Without a store (bypass or degraded mode) every lookup is a MISS and
/// nothing is persisted; single-flight still applies.
pub struct FetchCoordinator {
    store: Option<Store>,
    flights: SingleFlight<(Category, String), Fetched>,
    producer_timeout: Option<Duration>,
}

impl FetchCoordinator {
    /// Coordinate fetches over an open store.
    pub fn new(storage: CacheStorage) -> Self {
        Self {
            store: Some(Arc::new(Mutex::new(storage))),
            flights: SingleFlight::new(),
            producer_timeout: None,
        }
    }

    /// Coordinate fetches without any persistence (`--no-cache`).
    pub fn bypass() -> Self {
        Self {
            store: None,
            flights: SingleFlight::new(),
            producer_timeout: None,
        }
    }

    /// Open the store in `cache_dir` (or the default location).
    ///
    /// A store that cannot be opened degrades to bypass mode instead of
    /// failing: requests still succeed, they just always hit the producer.
    pub fn open(cache_dir: Option<&Path>, enabled: bool) -> Self {
        if !enabled {
            return Self::bypass();
        }

        let opened = match cache_dir {
            Some(dir) => CacheStorage::open_at(dir, TtlPolicy::standard()),
            None => CacheStorage::open(TtlPolicy::standard()),
        };

        match opened {
            Ok(storage) => Self::new(storage),
            Err(e) => {
                warn!("Cache unavailable ({}), continuing without persistence", e);
                Self::bypass()
            }
        }
    }

    /// Treat producers that run longer than `timeout` as failed.
    pub fn with_producer_timeout(mut self, timeout: Duration) -> Self {
        self.producer_timeout = Some(timeout);
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Run `f` against the store, if there is one.
    pub(crate) fn with_store<R>(&self, f: impl FnOnce(&CacheStorage) -> R) -> Option<R> {
        let store = self.store.as_ref()?;
        let guard = store.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&guard))
    }

    /// Store statistics, `None` when running without a store
    pub fn stats(&self) -> Result<Option<CacheStats>> {
        match self.with_store(|s| s.stats()) {
            Some(stats) => Ok(Some(stats?)),
            None => Ok(None),
        }
    }

    /// Serve `(category, key)` from the store or refresh it with `producer`.
    pub async fn get_or_produce<F, Fut>(
        &self,
        category: Category,
        key: &str,
        producer: F,
    ) -> std::result::Result<Fetched, FetchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<u8>>> + Send + 'static,
    {
        let existing = read_entry(self.store.as_ref(), category, key);

        match classify(existing.as_ref(), Utc::now()) {
            Freshness::Hit => {
                debug!("Cache hit: {}/{}", category, key);
                if let Some(entry) = existing {
                    return Ok(Fetched::from_entry(entry, Provenance::Cached));
                }
            }
            Freshness::Stale => debug!("Cache stale: {}/{}", category, key),
            Freshness::Miss => debug!("Cache miss: {}/{}", category, key),
        }

        let store = self.store.clone();
        let timeout = self.producer_timeout;
        let owned_key = key.to_string();

        self.flights
            .run((category, key.to_string()), move || {
                refresh(store, category, owned_key, timeout, producer)
            })
            .await
    }

    /// Typed wrapper over [`get_or_produce`](Self::get_or_produce).
    ///
    /// The producer's value is stored as JSON and decoded on the way out.
    pub async fn fetch_json<T, F, Fut>(
        &self,
        category: Category,
        key: &str,
        producer: F,
    ) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let fetched = self
            .get_or_produce(category, key, move || async move {
                let value = producer().await?;
                Ok(serde_json::to_vec(&value)?)
            })
            .await?;

        let value = serde_json::from_slice(&fetched.payload)?;
        Ok(Cached {
            value,
            provenance: fetched.provenance,
            stored_at: fetched.stored_at,
        })
    }
}

/// Body of the in-flight slot: run the producer and write through.
async fn refresh<F, Fut>(
    store: Option<Store>,
    category: Category,
    key: String,
    timeout: Option<Duration>,
    producer: F,
) -> std::result::Result<Fetched, FetchError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<u8>>>,
{
    // A producer that finished between classification and slot acquisition
    // already refreshed the entry.
    let existing = read_entry(store.as_ref(), category, &key);
    if let Some(entry) = existing.as_ref()
        && classify(Some(entry), Utc::now()) == Freshness::Hit
    {
        debug!("Cache refreshed concurrently: {}/{}", category, key);
        return Ok(Fetched::from_entry(entry.clone(), Provenance::Cached));
    }

    let produced = match timeout {
        Some(limit) => match tokio::time::timeout(limit, producer()).await {
            Ok(result) => result.map_err(|e| FetchError::Producer(e.to_string())),
            Err(_) => Err(FetchError::Timeout(limit)),
        },
        None => producer()
            .await
            .map_err(|e| FetchError::Producer(e.to_string())),
    };

    match produced {
        Ok(payload) => {
            let stored_at = write_entry(store.as_ref(), category, &key, &payload);
            info!("Refreshed {}/{} ({} bytes)", category, key, payload.len());
            Ok(Fetched {
                payload,
                provenance: Provenance::Fresh,
                stored_at,
            })
        }
        Err(err) => match existing {
            Some(entry) => {
                warn!(
                    "Refresh of {}/{} failed ({}), serving value stored at {}",
                    category, key, err, entry.created_at
                );
                Ok(Fetched::from_entry(entry, Provenance::Stale))
            }
            None => {
                warn!("Refresh of {}/{} failed with nothing cached: {}", category, key, err);
                let reason = match err {
                    FetchError::Producer(msg) => msg,
                    other => other.to_string(),
                };
                Err(FetchError::NotFound {
                    category,
                    key,
                    reason,
                })
            }
        },
    }
}

/// Read an entry; a failing store reads as a MISS.
fn read_entry(store: Option<&Store>, category: Category, key: &str) -> Option<CacheEntry> {
    let store = store?;
    let guard = store.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.get(category, key) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Cache read failed for {}/{}: {}", category, key, e);
            None
        }
    }
}

/// Write through; a failing store is logged and the value still served.
fn write_entry(
    store: Option<&Store>,
    category: Category,
    key: &str,
    payload: &[u8],
) -> Option<DateTime<Utc>> {
    let store = store?;
    let guard = store.lock().unwrap_or_else(PoisonError::into_inner);
    match guard.put(category, key, payload) {
        Ok(entry) => Some(entry.created_at),
        Err(e) => {
            warn!("Cache write failed for {}/{}: {}", category, key, e);
            None
        }
    }
}
