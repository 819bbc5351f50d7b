//! SQLite-backed passage store.

use super::{Passage, PassageStore, Video};
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS videos (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS passages (
    id TEXT PRIMARY KEY,
    video_id TEXT NOT NULL,
    start_seconds REAL NOT NULL,
    end_seconds REAL NOT NULL,
    text TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_passages_video_id ON passages(video_id);
"#;

/// SQLite passage store.
pub struct SqlitePassageStore {
    conn: Mutex<Connection>,
}

impl SqlitePassageStore {
    /// Open (or create) a passage database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite passage store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory passage store (useful for testing).
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
            .map_err(|e| SvarError::PassageStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Insert or replace a video record.
    pub fn upsert_video(&self, video: &Video) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO videos (id, title) VALUES (?1, ?2)",
            params![video.id, video.title],
        )?;
        Ok(())
    }

    /// Insert or replace passages in one transaction.
    #[instrument(skip(self, passages), fields(count = passages.len()))]
    pub fn insert_passages(&self, passages: &[Passage]) -> Result<usize> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        for p in passages {
            tx.execute(
                r#"
                INSERT OR REPLACE INTO passages (id, video_id, start_seconds, end_seconds, text)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![p.id, p.video_id, p.start, p.end, p.text],
            )?;
        }

        tx.commit()?;
        info!("Stored {} passages", passages.len());
        Ok(passages.len())
    }
}

/// `?1, ?2, ...` for an IN clause of `n` values.
fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

#[async_trait]
impl PassageStore for SqlitePassageStore {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn fetch_passages(&self, ids: &[String]) -> Result<Vec<Passage>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let sql = format!(
            "SELECT id, video_id, start_seconds, end_seconds, text FROM passages WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
            Ok(Passage {
                id: row.get(0)?,
                video_id: row.get(1)?,
                start: row.get(2)?,
                end: row.get(3)?,
                text: row.get(4)?,
            })
        })?;

        let passages = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        debug!("Fetched {} of {} passages", passages.len(), ids.len());
        Ok(passages)
    }

    #[instrument(skip(self, video_ids), fields(count = video_ids.len()))]
    async fn fetch_titles(&self, video_ids: &[String]) -> Result<HashMap<String, String>> {
        if video_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let conn = self.lock()?;
        let sql = format!(
            "SELECT id, title FROM videos WHERE id IN ({})",
            placeholders(video_ids.len())
        );
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt.query_map(params_from_iter(video_ids.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let titles = rows.collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(titles)
    }
}
