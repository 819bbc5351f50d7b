//! Passage and video records in persistent storage.
//!
//! Passages are written by the ingestion side and are immutable afterwards;
//! the answering pipeline only reads them.

mod hydrate;
mod sqlite;

pub use hydrate::{Hydration, Hydrator};
pub use sqlite::SqlitePassageStore;

use crate::error::Result;
use crate::vector_store::CandidateMatch;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A transcript passage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    /// Unique passage ID.
    pub id: String,
    /// Video this passage belongs to.
    pub video_id: String,
    /// Start offset in the video (seconds).
    pub start: f64,
    /// End offset in the video (seconds).
    pub end: f64,
    /// Transcript text.
    pub text: String,
}

impl Passage {
    /// Stand-in for a passage the store could not return.
    ///
    /// Keeps the slot of `candidate` so later positions do not shift. Source
    /// fields come from the index metadata when present; the text is empty.
    pub fn placeholder(candidate: &CandidateMatch) -> Self {
        let metadata = &candidate.metadata;
        Self {
            id: candidate.id.clone(),
            video_id: metadata
                .get("video_id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            start: metadata.get("start").and_then(|v| v.as_f64()).unwrap_or(0.0),
            end: metadata.get("end").and_then(|v| v.as_f64()).unwrap_or(0.0),
            text: String::new(),
        }
    }

    /// Start offset in whole seconds, as used in citations and links.
    pub fn start_secs(&self) -> u64 {
        self.start.max(0.0) as u64
    }
}

/// A video with its display title.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Video {
    pub id: String,
    pub title: String,
}

/// Title shown for `video_id`, falling back to a generic label.
pub fn display_title(titles: &HashMap<String, String>, video_id: &str) -> String {
    titles
        .get(video_id)
        .filter(|t| !t.trim().is_empty())
        .cloned()
        .unwrap_or_else(|| format!("YouTube {}", video_id))
}

/// Read access to persisted passages and videos.
#[async_trait]
pub trait PassageStore: Send + Sync {
    /// Passages whose IDs are in `ids`, in any order. Unknown IDs are skipped.
    async fn fetch_passages(&self, ids: &[String]) -> Result<Vec<Passage>>;

    /// Titles for the given videos. Unknown videos are skipped.
    async fn fetch_titles(&self, video_ids: &[String]) -> Result<HashMap<String, String>>;
}
