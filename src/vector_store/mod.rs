//! Vector index abstraction for Svar.
//!
//! Approximate nearest-neighbour search over a namespaced, filterable index.
//! The index is populated by the ingestion side; the answering pipeline only
//! sizes it once and queries it.

mod memory;
mod sqlite;

pub use memory::MemoryVectorIndex;
pub use sqlite::SqliteVectorIndex;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Metadata attached to an indexed vector.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A search hit, ordered by descending score in query results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateMatch {
    /// Passage identifier.
    pub id: String,
    /// Similarity score (higher is better).
    pub score: f32,
    /// Metadata stored with the vector (empty unless requested).
    #[serde(default)]
    pub metadata: Metadata,
}

/// A vector to store in the index.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

/// Restricts a search to vectors whose `video_id` metadata is in a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    video_ids: Vec<String>,
}

impl MetadataFilter {
    /// Filter on a set of video identifiers. Order and duplicates are irrelevant.
    pub fn video_ids(mut ids: Vec<String>) -> Self {
        ids.sort();
        ids.dedup();
        Self { video_ids: ids }
    }

    /// Filter in index query form: `{"video_id": {"$in": [...]}}`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "video_id": { "$in": self.video_ids } })
    }

    /// Stable serialization used for hashing.
    pub fn canonical_json(&self) -> String {
        self.to_json().to_string()
    }

    /// Whether a vector with `metadata` passes the filter.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        metadata
            .get("video_id")
            .and_then(|v| v.as_str())
            .is_some_and(|id| self.video_ids.iter().any(|allowed| allowed == id))
    }
}

/// Trait for vector index implementations.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Make sure the index exists and is sized for `dimension`.
    async fn ensure_index(&self, dimension: usize) -> Result<()>;

    /// Nearest neighbours of `vector` within `namespace`, best first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        filter: Option<&MetadataFilter>,
        include_metadata: bool,
    ) -> Result<Vec<CandidateMatch>>;

    /// Insert or replace vectors in `namespace`.
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Score, filter, sort and truncate candidates. Ties keep insertion order.
pub(crate) fn rank<'a>(
    vector: &[f32],
    rows: impl Iterator<Item = (&'a str, &'a [f32], &'a Metadata)>,
    top_k: usize,
    filter: Option<&MetadataFilter>,
    include_metadata: bool,
) -> Vec<CandidateMatch> {
    let mut matches: Vec<CandidateMatch> = rows
        .filter(|(_, _, metadata)| filter.map_or(true, |f| f.matches(metadata)))
        .map(|(id, values, metadata)| CandidateMatch {
            id: id.to_string(),
            score: cosine_similarity(vector, values),
            metadata: if include_metadata {
                metadata.clone()
            } else {
                Metadata::new()
            },
        })
        .collect();

    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    matches.truncate(top_k);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_filter_json_and_matching() {
        let filter = MetadataFilter::video_ids(vec!["vid2".into(), "vid1".into(), "vid2".into()]);
        assert_eq!(filter.to_json(), json!({"video_id": {"$in": ["vid1", "vid2"]}}));

        let mut metadata = Metadata::new();
        metadata.insert("video_id".into(), json!("vid1"));
        assert!(filter.matches(&metadata));

        metadata.insert("video_id".into(), json!("vid3"));
        assert!(!filter.matches(&metadata));
        assert!(!filter.matches(&Metadata::new()));
    }

    #[test]
    fn test_candidate_match_cache_shape() {
        let m: CandidateMatch = serde_json::from_value(json!({"id": "p1", "score": 0.5})).unwrap();
        assert!(m.metadata.is_empty());
    }
}
