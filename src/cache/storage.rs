//! SQLite-based persistent store for cache entries
//!
//! One logical table keyed by `(category, cache_key)`. Payloads are opaque
//! blobs; expiry is derived from the [`TtlPolicy`] at write time.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};

use super::maintenance::InvalidateScope;
use super::{Category, TtlPolicy};
use crate::error::CacheError;

/// Schema version - increment to trigger nuke-and-rebuild
const SCHEMA_VERSION: i32 = 1;

const DB_FILE: &str = "cache.db";

type Result<T> = std::result::Result<T, CacheError>;

/// A stored cache row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub category: Category,
    pub key: String,
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// SQLite-backed cache storage
pub struct CacheStorage {
    conn: Connection,
    policy: TtlPolicy,
    path: PathBuf,
}

impl CacheStorage {
    /// Open or create cache storage at the default XDG cache location
    pub fn open(policy: TtlPolicy) -> Result<Self> {
        let cache_dir = Self::cache_dir()?;
        Self::open_at(&cache_dir, policy)
    }

    /// Get the cache directory path (~/.cache/stockcast on Linux)
    pub fn cache_dir() -> Result<PathBuf> {
        let cache_base = dirs::cache_dir().ok_or(CacheError::NoHome)?;
        Ok(cache_base.join("stockcast"))
    }

    /// Open cache storage in a specific directory
    pub fn open_at(cache_dir: &Path, policy: TtlPolicy) -> Result<Self> {
        std::fs::create_dir_all(cache_dir)
            .map_err(|e| CacheError::Io(format!("Failed to create cache dir: {}", e)))?;

        let db_path = cache_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)?;

        // Check schema version - nuke if mismatched
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |r| r.get(0))
            .unwrap_or(0);

        if version != 0 && version != SCHEMA_VERSION {
            log::info!(
                "Cache schema version mismatch ({} != {}), rebuilding",
                version,
                SCHEMA_VERSION
            );
            drop(conn);
            Self::nuke(&db_path)?;
            return Self::open_at(cache_dir, policy);
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                category TEXT NOT NULL,
                cache_key TEXT NOT NULL,
                payload BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                PRIMARY KEY (category, cache_key)
            );

            CREATE INDEX IF NOT EXISTS idx_expires_at ON cache_entries(expires_at);
            CREATE INDEX IF NOT EXISTS idx_category ON cache_entries(category);
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        Ok(Self {
            conn,
            policy,
            path: db_path,
        })
    }

    /// Path of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> TtlPolicy {
        self.policy
    }

    /// Look up an entry regardless of its freshness
    pub fn get(&self, category: Category, key: &str) -> Result<Option<CacheEntry>> {
        let row: Option<(Vec<u8>, i64, i64)> = self
            .conn
            .query_row(
                "SELECT payload, created_at, expires_at FROM cache_entries
                 WHERE category = ?1 AND cache_key = ?2",
                params![category.as_str(), key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(row.map(|(payload, created, expires)| CacheEntry {
            category,
            key: key.to_string(),
            payload,
            created_at: from_millis(created),
            expires_at: from_millis(expires),
        }))
    }

    /// Upsert a payload; expiry comes from the policy table.
    pub fn put(&self, category: Category, key: &str, payload: &[u8]) -> Result<CacheEntry> {
        self.put_at(category, key, payload, Utc::now())
    }

    pub(crate) fn put_at(
        &self,
        category: Category,
        key: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<CacheEntry> {
        let expires_at = now
            .checked_add_signed(self.policy.ttl(category))
            .unwrap_or(now);

        self.conn.execute(
            "INSERT OR REPLACE INTO cache_entries
             (category, cache_key, payload, created_at, expires_at, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                category.as_str(),
                key,
                payload,
                now.timestamp_millis(),
                expires_at.timestamp_millis(),
                payload.len() as i64
            ],
        )?;

        Ok(CacheEntry {
            category,
            key: key.to_string(),
            payload: payload.to_vec(),
            created_at: truncate_millis(now),
            expires_at: truncate_millis(expires_at),
        })
    }

    /// Remove every entry of a category regardless of freshness
    pub fn delete_category(&self, category: Category) -> Result<usize> {
        self.delete_matching(&InvalidateScope::Category(category), Utc::now(), None)
    }

    /// Remove every entry whose expiry lies before now
    pub fn delete_expired(&self) -> Result<usize> {
        self.delete_matching(&InvalidateScope::Expired, Utc::now(), None)
    }

    /// Remove every entry
    pub fn delete_all(&self) -> Result<usize> {
        self.delete_matching(&InvalidateScope::All, Utc::now(), None)
    }

    /// Delete rows matching `scope`, at most `limit` of them when given.
    ///
    /// Maintenance calls this repeatedly with a limit so the store lock is
    /// only held for one batch at a time.
    pub(crate) fn delete_matching(
        &self,
        scope: &InvalidateScope,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<usize> {
        let (filter, param): (&str, Option<rusqlite::types::Value>) = match scope {
            InvalidateScope::Category(category) => (
                "category = ?1",
                Some(category.as_str().to_string().into()),
            ),
            InvalidateScope::Expired => ("expires_at < ?1", Some(now.timestamp_millis().into())),
            InvalidateScope::All => ("1 = 1", None),
        };

        let sql = match limit {
            Some(limit) => format!(
                "DELETE FROM cache_entries WHERE rowid IN
                 (SELECT rowid FROM cache_entries WHERE {} LIMIT {})",
                filter, limit
            ),
            None => format!("DELETE FROM cache_entries WHERE {}", filter),
        };

        let deleted = match param {
            Some(value) => self.conn.execute(&sql, [value])?,
            None => self.conn.execute(&sql, [])?,
        };
        Ok(deleted)
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let now = Utc::now().timestamp_millis();

        let total_entries: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |r| r.get(0))?;

        let valid_entries: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE expires_at > ?1",
            [now],
            |r| r.get(0),
        )?;

        let total_size: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM cache_entries",
            [],
            |r| r.get(0),
        )?;

        let (oldest, newest): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM cache_entries WHERE expires_at > ?1",
            [now],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT category, COUNT(*) FROM cache_entries
             WHERE expires_at > ?1 GROUP BY category",
        )?;
        let rows = stmt.query_map([now], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;

        let mut by_category = Vec::new();
        for row in rows {
            let (name, count) = row?;
            match name.parse::<Category>() {
                Ok(category) => by_category.push((category, count as usize)),
                Err(_) => log::warn!("Ignoring cache rows with unknown category '{}'", name),
            }
        }
        by_category.sort_by_key(|(c, _)| c.as_str());

        Ok(CacheStats {
            total_entries: total_entries as usize,
            valid_entries: valid_entries as usize,
            expired_entries: (total_entries - valid_entries) as usize,
            total_size_bytes: total_size as usize,
            oldest_entry: oldest.map(from_millis),
            newest_entry: newest.map(from_millis),
            by_category,
        })
    }

    /// Nuke the cache database
    fn nuke(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            std::fs::remove_file(db_path)
                .map_err(|e| CacheError::Io(format!("Failed to remove cache DB: {}", e)))?;
        }
        Ok(())
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(t.timestamp_millis())
}

/// Statistics about cache state
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub total_size_bytes: usize,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
    /// Valid entries per category
    pub by_category: Vec<(Category, usize)>,
}

/// Offset `now` by a TTL; handy for tests that need entries with known ages.
#[cfg(test)]
pub(crate) fn ago(delta: chrono::TimeDelta) -> DateTime<Utc> {
    Utc::now() - delta
}
