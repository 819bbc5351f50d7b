//! Context blocks handed to generation, and the citations derived from them.

use crate::passage_store::Passage;
use serde::{Deserialize, Serialize};

/// Separator between context blocks in the generation prompt.
pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

/// A source citation returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub video_id: String,
    pub title: String,
    pub start: f64,
    pub end: f64,
    pub url: String,
}

/// One grounded passage as the generator sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextBlock {
    pub title: String,
    pub video_id: String,
    pub start_secs: u64,
    pub text: String,
}

impl ContextBlock {
    pub fn new(passage: &Passage, title: &str) -> Self {
        Self {
            title: title.to_string(),
            video_id: passage.video_id.clone(),
            start_secs: passage.start_secs(),
            text: passage.text.clone(),
        }
    }

    /// `[title | video_id | start s]` header followed by the passage text.
    pub fn render(&self) -> String {
        format!(
            "[{} | {} | {}s]\n{}",
            self.title, self.video_id, self.start_secs, self.text
        )
    }
}

impl Source {
    pub fn new(passage: &Passage, title: &str) -> Self {
        Self {
            video_id: passage.video_id.clone(),
            title: title.to_string(),
            start: passage.start,
            end: passage.end,
            url: ts_url(&passage.video_id, passage.start_secs()),
        }
    }
}

/// Rerank candidate text: `video_id @ start s` header and the passage text.
pub fn candidate_text(passage: &Passage) -> String {
    format!("{} @ {}s\n{}", passage.video_id, passage.start_secs(), passage.text)
}

/// Timestamp-anchored watch link for a video.
pub fn ts_url(video_id: &str, start_secs: u64) -> String {
    let mut url = url::Url::parse("https://www.youtube.com/watch").expect("static base URL");
    url.query_pairs_mut()
        .append_pair("v", video_id)
        .append_pair("t", &format!("{}s", start_secs));
    url.to_string()
}
