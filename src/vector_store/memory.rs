//! In-memory vector index implementation.
//!
//! Useful for testing and small datasets.

use super::{rank, CandidateMatch, Metadata, MetadataFilter, VectorIndex, VectorRecord};
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct State {
    dimension: Option<usize>,
    /// Namespace -> records in insertion order.
    namespaces: HashMap<String, Vec<(String, Vec<f32>, Metadata)>>,
}

/// In-memory vector index.
pub struct MemoryVectorIndex {
    state: RwLock<State>,
}

impl MemoryVectorIndex {
    /// Create a new in-memory vector index.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Dimension fixed by `ensure_index`, if any.
    pub fn dimension(&self) -> Option<usize> {
        self.state.read().ok().and_then(|s| s.dimension)
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_error<T>(e: std::sync::PoisonError<T>) -> SvarError {
    SvarError::Search(format!("Failed to acquire lock: {}", e))
}

fn check_dimension(expected: Option<usize>, actual: usize) -> Result<()> {
    match expected {
        Some(dim) if dim != actual => Err(SvarError::Search(format!(
            "Vector has {} dimensions, index expects {}",
            actual, dim
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn ensure_index(&self, dimension: usize) -> Result<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        check_dimension(state.dimension, dimension)?;
        state.dimension = Some(dimension);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        filter: Option<&MetadataFilter>,
        include_metadata: bool,
    ) -> Result<Vec<CandidateMatch>> {
        let state = self.state.read().map_err(lock_error)?;
        check_dimension(state.dimension, vector.len())?;

        let Some(records) = state.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };

        Ok(rank(
            vector,
            records
                .iter()
                .map(|(id, values, metadata)| (id.as_str(), values.as_slice(), metadata)),
            top_k,
            filter,
            include_metadata,
        ))
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize> {
        let mut state = self.state.write().map_err(lock_error)?;
        for record in records {
            check_dimension(state.dimension, record.values.len())?;
        }

        let stored = state.namespaces.entry(namespace.to_string()).or_default();
        for record in records {
            let entry = (record.id.clone(), record.values.clone(), record.metadata.clone());
            match stored.iter_mut().find(|(id, _, _)| *id == record.id) {
                Some(existing) => *existing = entry,
                None => stored.push(entry),
            }
        }
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, video_id: &str, values: Vec<f32>) -> VectorRecord {
        let mut metadata = Metadata::new();
        metadata.insert("video_id".into(), json!(video_id));
        VectorRecord {
            id: id.to_string(),
            values,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_memory_vector_index() {
        let index = MemoryVectorIndex::new();
        index.ensure_index(3).await.unwrap();

        index
            .upsert(
                "talks",
                &[
                    record("p1", "v1", vec![1.0, 0.0, 0.0]),
                    record("p2", "v2", vec![0.7, 0.7, 0.0]),
                    record("p3", "v1", vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = index.query(&[1.0, 0.0, 0.0], 2, "talks", None, true).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "p1");
        assert_eq!(results[1].id, "p2");
        assert_eq!(results[0].metadata.get("video_id"), Some(&json!("v1")));

        let bare = index.query(&[1.0, 0.0, 0.0], 1, "talks", None, false).await.unwrap();
        assert!(bare[0].metadata.is_empty());
    }

    #[tokio::test]
    async fn test_namespaces_are_isolated() {
        let index = MemoryVectorIndex::new();
        index.upsert("a", &[record("p1", "v1", vec![1.0, 0.0])]).await.unwrap();

        assert!(index.query(&[1.0, 0.0], 5, "b", None, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_filter_restricts_videos() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(
                "ns",
                &[
                    record("p1", "v1", vec![1.0, 0.0]),
                    record("p2", "v2", vec![0.9, 0.1]),
                ],
            )
            .await
            .unwrap();

        let filter = MetadataFilter::video_ids(vec!["v2".into()]);
        let results = index.query(&[1.0, 0.0], 5, "ns", Some(&filter), true).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "p2");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_rejected() {
        let index = MemoryVectorIndex::new();
        index.ensure_index(3).await.unwrap();
        assert!(index.ensure_index(4).await.is_err());
        assert!(index.query(&[1.0, 0.0], 5, "ns", None, true).await.is_err());
        assert_eq!(index.dimension(), Some(3));
    }
}
