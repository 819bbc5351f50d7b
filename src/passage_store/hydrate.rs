//! Position-preserving passage hydration with a per-passage cache.

use super::{Passage, PassageStore};
use crate::cache::{keys, Cache};
use crate::error::{Result, SvarError};
use crate::vector_store::CandidateMatch;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Outcome of hydrating a candidate list.
#[derive(Debug, Clone)]
pub struct Hydration {
    /// One passage per candidate, in candidate order. Missing passages are
    /// empty-text placeholders.
    pub passages: Vec<Passage>,
    /// Number of slots served from the cache.
    pub cache_hits: usize,
    /// IDs that neither the cache nor the store could provide.
    pub missing: Vec<String>,
}

impl Hydration {
    /// True when no slot needed the persistent store.
    pub fn fully_cached(&self) -> bool {
        self.cache_hits == self.passages.len()
    }
}

/// Resolves candidate IDs into passages: cache first, then the store for misses only.
pub struct Hydrator {
    cache: Cache,
    store: Arc<dyn PassageStore>,
    ttl: Duration,
    batch_size: usize,
    call_timeout: Duration,
}

impl Hydrator {
    pub fn new(
        cache: Cache,
        store: Arc<dyn PassageStore>,
        ttl: Duration,
        batch_size: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            store,
            ttl,
            batch_size: batch_size.max(1),
            call_timeout,
        }
    }

    /// Hydrate `candidates` without reordering or dropping any position.
    ///
    /// A failed store batch leaves its IDs missing. The store error is only
    /// returned when nothing at all could be hydrated.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub async fn hydrate(&self, candidates: &[CandidateMatch]) -> Result<Hydration> {
        let mut slots: Vec<Option<Passage>> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            slots.push(self.cache.get::<Passage>(&keys::passage_key(&candidate.id)).await);
        }
        let cache_hits = slots.iter().filter(|s| s.is_some()).count();

        let mut misses: Vec<String> = Vec::new();
        for (candidate, slot) in candidates.iter().zip(&slots) {
            if slot.is_none() && !misses.contains(&candidate.id) {
                misses.push(candidate.id.clone());
            }
        }

        let mut fetched: HashMap<String, Passage> = HashMap::new();
        let mut failures: Vec<SvarError> = Vec::new();

        for batch in misses.chunks(self.batch_size) {
            match tokio::time::timeout(self.call_timeout, self.store.fetch_passages(batch)).await {
                Ok(Ok(passages)) => {
                    for passage in passages {
                        self.cache
                            .set(&keys::passage_key(&passage.id), &passage, self.ttl)
                            .await;
                        fetched.insert(passage.id.clone(), passage);
                    }
                }
                Ok(Err(e)) => {
                    warn!("Passage batch of {} failed: {}", batch.len(), e);
                    failures.push(e);
                }
                Err(_) => {
                    warn!("Passage batch of {} timed out", batch.len());
                    failures.push(SvarError::Timeout {
                        stage: "hydrating",
                        secs: self.call_timeout.as_secs(),
                    });
                }
            }
        }

        if cache_hits == 0 && fetched.is_empty() && !failures.is_empty() {
            let first = failures.remove(0);
            return Err(match first {
                SvarError::Timeout { .. } | SvarError::PassageStore(_) => first,
                other => SvarError::PassageStore(other.to_string()),
            });
        }

        let mut missing = Vec::new();
        let passages: Vec<Passage> = candidates
            .iter()
            .zip(slots)
            .map(|(candidate, slot)| {
                slot.or_else(|| fetched.get(&candidate.id).cloned())
                    .unwrap_or_else(|| {
                        missing.push(candidate.id.clone());
                        Passage::placeholder(candidate)
                    })
            })
            .collect();

        if !missing.is_empty() {
            warn!(
                missing = ?missing,
                "Hydration partial: {} of {} passages unavailable, using empty placeholders",
                missing.len(),
                passages.len()
            );
        }
        debug!("Hydrated {} passages ({} from cache)", passages.len(), cache_hits);

        Ok(Hydration {
            passages,
            cache_hits,
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::passage_store::SqlitePassageStore;
    use crate::test_support::{candidate, passage, FlakyPassageStore};

    fn hydrator(store: Arc<dyn PassageStore>, cache: Cache) -> Hydrator {
        Hydrator::new(cache, store, Duration::from_secs(3600), 2, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_missing_passage_keeps_its_slot() {
        let store = SqlitePassageStore::in_memory().unwrap();
        store
            .insert_passages(&[passage("a", "v1", 0.0), passage("c", "v1", 60.0)])
            .unwrap();
        let cache = Cache::new(Arc::new(MemoryCache::new()));
        let hydrator = hydrator(Arc::new(store), cache);

        let candidates = vec![candidate("a", "v1"), candidate("b", "v1"), candidate("c", "v1")];
        let hydration = hydrator.hydrate(&candidates).await.unwrap();

        assert_eq!(hydration.passages.len(), 3);
        assert_eq!(hydration.passages[0].id, "a");
        assert_eq!(hydration.passages[1].id, "b");
        assert!(hydration.passages[1].text.is_empty());
        assert_eq!(hydration.passages[2].id, "c");
        assert_eq!(hydration.missing, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_second_pass_is_served_from_cache() {
        let store = Arc::new(FlakyPassageStore::with_passages(vec![
            passage("a", "v1", 0.0),
            passage("b", "v2", 10.0),
        ]));
        let cache = Cache::new(Arc::new(MemoryCache::new()));
        let hydrator = hydrator(store.clone(), cache);
        let candidates = vec![candidate("b", "v2"), candidate("a", "v1")];

        let first = hydrator.hydrate(&candidates).await.unwrap();
        assert!(!first.fully_cached());
        assert_eq!(store.fetches(), 1);

        let second = hydrator.hydrate(&candidates).await.unwrap();
        assert!(second.fully_cached());
        assert_eq!(store.fetches(), 1);
        assert_eq!(second.passages, first.passages);
        assert_eq!(second.passages[0].id, "b");
    }

    #[tokio::test]
    async fn test_only_misses_are_fetched() {
        let store = Arc::new(FlakyPassageStore::with_passages(vec![
            passage("a", "v1", 0.0),
            passage("b", "v1", 30.0),
        ]));
        let cache = Cache::new(Arc::new(MemoryCache::new()));
        cache
            .set(&keys::passage_key("a"), &passage("a", "v1", 0.0), Duration::from_secs(60))
            .await;
        let hydrator = hydrator(store.clone(), cache);

        let hydration = hydrator
            .hydrate(&[candidate("a", "v1"), candidate("b", "v1")])
            .await
            .unwrap();

        assert_eq!(hydration.cache_hits, 1);
        assert_eq!(store.requested(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_batch_degrades_to_placeholders() {
        // Batch size 2: [a, b] fails, [c] succeeds.
        let store = Arc::new(
            FlakyPassageStore::with_passages(vec![
                passage("a", "v1", 0.0),
                passage("b", "v1", 30.0),
                passage("c", "v1", 60.0),
            ])
            .failing_on("a"),
        );
        let cache = Cache::new(Arc::new(MemoryCache::new()));
        let hydrator = hydrator(store, cache);

        let hydration = hydrator
            .hydrate(&[candidate("a", "v1"), candidate("b", "v1"), candidate("c", "v1")])
            .await
            .unwrap();

        assert_eq!(hydration.passages.len(), 3);
        assert_eq!(hydration.missing, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(hydration.passages[2].text, "text of c");
    }

    #[tokio::test]
    async fn test_total_failure_propagates() {
        let store = Arc::new(FlakyPassageStore::with_passages(vec![]).failing_on("a"));
        let cache = Cache::new(Arc::new(MemoryCache::new()));
        let hydrator = hydrator(store, cache);

        let err = hydrator.hydrate(&[candidate("a", "v1")]).await.unwrap_err();
        assert_eq!(err.kind(), "passage_store");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let store = Arc::new(
            FlakyPassageStore::with_passages(vec![passage("a", "v1", 0.0)])
                .delayed(Duration::from_secs(30)),
        );
        let cache = Cache::new(Arc::new(MemoryCache::new()));
        cache
            .set(&keys::passage_key("b"), &passage("b", "v1", 30.0), Duration::from_secs(60))
            .await;
        let hydrator = hydrator(store.clone(), cache);

        let err = hydrator.hydrate(&[candidate("a", "v1")]).await.unwrap_err();
        assert!(matches!(err, SvarError::Timeout { stage: "hydrating", secs: 5 }), "{:?}", err);

        // A cached slot keeps the request alive; the timed-out one becomes a placeholder.
        let hydration = hydrator
            .hydrate(&[candidate("b", "v1"), candidate("a", "v1")])
            .await
            .unwrap();
        assert_eq!(hydration.missing, vec!["a".to_string()]);
        assert_eq!(hydration.passages[0].text, "text of b");
        assert_eq!(store.fetches(), 2);
    }
}
