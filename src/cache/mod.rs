//! TTL-keyed cache shared by every pipeline stage.
//!
//! One [`CacheStore`] capability (`get`/`set` with an explicit TTL) is
//! implemented per backend. Stages never talk to a store directly: they go
//! through the typed [`Cache`] facade with keys built by the pure functions
//! in [`keys`]. Caching is an optimization only, so the facade turns every
//! backend failure into a miss (reads) or a dropped write.

pub mod keys;
mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use crate::config::{Backend, CacheSettings, Settings};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Key-value store with absolute expiry.
///
/// Backends report an unreachable store as `SvarError::CacheUnavailable`.
/// A read after expiry returns `None`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live value.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Store a value that expires `ttl` from now.
    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Duration) -> Result<()>;

    /// Remove every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}

/// Open the configured cache backend.
pub fn open_store(settings: &CacheSettings) -> Result<Arc<dyn CacheStore>> {
    Ok(match settings.provider {
        Backend::Sqlite => Arc::new(SqliteCache::new(&Settings::expand_path(&settings.sqlite_path))?),
        Backend::Memory => Arc::new(MemoryCache::new()),
    })
}

/// Absolute expiry for a value written at `now`, saturating on overflow.
pub(crate) fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Typed, failure-absorbing view over a [`CacheStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Read and decode a value. Backend errors and undecodable values are misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = match self.store.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(key = keys::key_prefix(key), "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = keys::key_prefix(key), "Cache read failed, treating as miss: {}", e);
                return None;
            }
        };

        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key = keys::key_prefix(key), "Discarding undecodable cache entry: {}", e);
                None
            }
        }
    }

    /// Encode and store a value. Failures are logged and dropped.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let encoded = match serde_json::to_value(value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = keys::key_prefix(key), "Skipping cache write, encode failed: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(key, &encoded, ttl).await {
            warn!(key = keys::key_prefix(key), "Cache write dropped: {}", e);
        }
    }

    /// Remove expired entries from the backing store.
    pub async fn purge_expired(&self) -> Result<usize> {
        self.store.purge_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::UnreachableCache;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Entry {
        vec: Vec<f32>,
    }

    #[tokio::test]
    async fn test_unavailable_store_reads_as_miss() {
        let cache = Cache::new(Arc::new(UnreachableCache));

        cache.set("qembed:m:abc", &Entry { vec: vec![1.0] }, Duration::from_secs(60)).await;
        let value: Option<Entry> = cache.get("qembed:m:abc").await;
        assert!(value.is_none());
        assert_eq!(cache.purge_expired().await.unwrap_err().kind(), "cache_unavailable");
    }

    #[tokio::test]
    async fn test_typed_round_trip_through_memory() {
        let cache = Cache::new(Arc::new(MemoryCache::new()));
        let entry = Entry { vec: vec![0.5, 0.25] };

        cache.set("qembed:m:abc", &entry, Duration::from_secs(60)).await;
        assert_eq!(cache.get::<Entry>("qembed:m:abc").await, Some(entry));
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_a_miss() {
        let cache = Cache::new(Arc::new(MemoryCache::new()));
        cache.set("k", &"just a string", Duration::from_secs(60)).await;

        assert!(cache.get::<Entry>("k").await.is_none());
    }
}
