//! SQLite-backed cache store.

use super::CacheStore;
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_expires_at ON cache_entries(expires_at);
"#;

/// Cache entries persisted in SQLite, expiry stored as unix milliseconds.
pub struct SqliteCache {
    conn: Mutex<Connection>,
}

impl SqliteCache {
    /// Open (or create) a cache database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite cache at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory cache database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SvarError::CacheUnavailable(format!("Failed to acquire lock: {}", e)))
    }

    pub(crate) fn get_at(&self, key: &str, now: DateTime<Utc>) -> Result<Option<serde_json::Value>> {
        let conn = self.lock()?;

        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(unavailable)?;

        match row {
            None => Ok(None),
            Some((value, expires_at)) if expires_at > now.timestamp_millis() => {
                Ok(Some(serde_json::from_str(&value)?))
            }
            Some(_) => {
                conn.execute(
                    "DELETE FROM cache_entries WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now.timestamp_millis()],
                )
                .map_err(unavailable)?;
                debug!("Evicted expired cache entry");
                Ok(None)
            }
        }
    }

    pub(crate) fn set_at(
        &self,
        key: &str,
        value: &serde_json::Value,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let expires_at = super::expiry(now, ttl).timestamp_millis();
        let encoded = serde_json::to_string(value)?;
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries (key, value, expires_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![key, encoded, expires_at],
        )
        .map_err(unavailable)?;
        Ok(())
    }

    pub(crate) fn purge_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![now.timestamp_millis()],
            )
            .map_err(unavailable)?;
        info!("Purged {} expired cache entries", removed);
        Ok(removed)
    }
}

fn unavailable(e: rusqlite::Error) -> SvarError {
    SvarError::CacheUnavailable(e.to_string())
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.get_at(key, Utc::now())
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> Result<()> {
        self.set_at(key, value, ttl, Utc::now())
    }

    async fn purge_expired(&self) -> Result<usize> {
        self.purge_at(Utc::now())
    }
}
