//! SQLite-based vector index implementation.
//!
//! Uses SQLite for storage with cosine similarity computed in Rust. Each
//! query scans one namespace, which is fine for per-user transcript corpora;
//! larger deployments should put a dedicated vector database behind
//! [`VectorIndex`](super::VectorIndex).

use super::{rank, CandidateMatch, Metadata, MetadataFilter, VectorIndex, VectorRecord};
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS vectors (
    namespace TEXT NOT NULL,
    id TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL,
    inserted_at INTEGER NOT NULL,
    PRIMARY KEY (namespace, id)
);

CREATE INDEX IF NOT EXISTS idx_vectors_namespace ON vectors(namespace);
"#;

/// SQLite-based vector index.
pub struct SqliteVectorIndex {
    conn: Mutex<Connection>,
}

impl SqliteVectorIndex {
    /// Open (or create) an index database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite vector index at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector index (useful for testing).
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
            .map_err(|e| SvarError::Search(format!("Failed to acquire lock: {}", e)))
    }

    fn stored_dimension(conn: &Connection) -> Result<Option<usize>> {
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        value
            .map(|v| {
                v.parse::<usize>()
                    .map_err(|e| SvarError::Search(format!("Corrupt index dimension {:?}: {}", v, e)))
            })
            .transpose()
    }

    fn check_dimension(conn: &Connection, actual: usize) -> Result<()> {
        match Self::stored_dimension(conn)? {
            Some(dim) if dim != actual => Err(SvarError::Search(format!(
                "Vector has {} dimensions, index expects {}",
                actual, dim
            ))),
            _ => Ok(()),
        }
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    #[instrument(skip(self))]
    async fn ensure_index(&self, dimension: usize) -> Result<()> {
        let conn = self.lock()?;
        Self::check_dimension(&conn, dimension)?;

        conn.execute(
            "INSERT OR IGNORE INTO index_meta (key, value) VALUES ('dimension', ?1)",
            params![dimension.to_string()],
        )?;
        debug!("Vector index ready with {} dimensions", dimension);
        Ok(())
    }

    #[instrument(skip(self, vector, filter))]
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        filter: Option<&MetadataFilter>,
        include_metadata: bool,
    ) -> Result<Vec<CandidateMatch>> {
        let conn = self.lock()?;
        Self::check_dimension(&conn, vector.len())?;

        let mut stmt = conn.prepare(
            r#"
            SELECT id, embedding, metadata
            FROM vectors
            WHERE namespace = ?1
            ORDER BY inserted_at, id
            "#,
        )?;

        let rows = stmt.query_map(params![namespace], |row| {
            let id: String = row.get(0)?;
            let embedding_bytes: Vec<u8> = row.get(1)?;
            let metadata: String = row.get(2)?;
            Ok((id, embedding_bytes, metadata))
        })?;

        let mut records: Vec<(String, Vec<f32>, Metadata)> = Vec::new();
        for row in rows {
            let (id, embedding_bytes, metadata) = row?;
            let metadata: Metadata = serde_json::from_str(&metadata)?;
            records.push((id, Self::bytes_to_embedding(&embedding_bytes), metadata));
        }

        let results = rank(
            vector,
            records
                .iter()
                .map(|(id, values, metadata)| (id.as_str(), values.as_slice(), metadata)),
            top_k,
            filter,
            include_metadata,
        );

        debug!("Found {} matching vectors", results.len());
        Ok(results)
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize> {
        let conn = self.lock()?;
        for record in records {
            Self::check_dimension(&conn, record.values.len())?;
        }

        let tx = conn.unchecked_transaction()?;
        let inserted_at = chrono::Utc::now().timestamp_millis();

        for record in records {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO vectors (namespace, id, embedding, metadata, inserted_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    namespace,
                    record.id,
                    Self::embedding_to_bytes(&record.values),
                    serde_json::to_string(&record.metadata)?,
                    inserted_at,
                ],
            )?;
        }

        tx.commit()?;
        info!("Upserted {} vectors into namespace {}", records.len(), namespace);
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
        metadata.insert("start".into(), json!(12.0));
        VectorRecord {
            id: id.to_string(),
            values,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_sqlite_vector_index() {
        let index = SqliteVectorIndex::in_memory().unwrap();
        index.ensure_index(3).await.unwrap();

        index
            .upsert(
                "talks",
                &[
                    record("p1", "v1", vec![1.0, 0.0, 0.0]),
                    record("p2", "v2", vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = index.query(&[1.0, 0.0, 0.0], 10, "talks", None, true).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "p1");
        assert!((results[0].score - 1.0).abs() < 0.001);
        assert_eq!(results[0].metadata.get("start"), Some(&json!(12.0)));

        let filter = MetadataFilter::video_ids(vec!["v2".into()]);
        let filtered = index
            .query(&[1.0, 0.0, 0.0], 10, "talks", Some(&filter), true)
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, "p2");

        assert!(index.query(&[1.0, 0.0, 0.0], 10, "other", None, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.db");

        SqliteVectorIndex::new(&path).unwrap().ensure_index(4).await.unwrap();

        let reopened = SqliteVectorIndex::new(&path).unwrap();
        assert!(reopened.ensure_index(4).await.is_ok());
        assert!(reopened.ensure_index(8).await.is_err());
        assert!(reopened
            .upsert("ns", &[record("p1", "v1", vec![1.0, 0.0])])
            .await
            .is_err());
    }

    #[test]
    fn test_embedding_bytes_round_trip() {
        let values = vec![0.25f32, -1.5, 3.0];
        let bytes = SqliteVectorIndex::embedding_to_bytes(&values);
        assert_eq!(SqliteVectorIndex::bytes_to_embedding(&bytes), values);
    }
}
