//! Scripted fakes of the collaborator traits, for unit tests.

use crate::cache::CacheStore;
use crate::embedding::Embedder;
use crate::error::{Result, SvarError};
use crate::llm::ChatModel;
use crate::passage_store::{Passage, PassageStore};
use crate::rag::AnswerGenerator;
use crate::vector_store::{CandidateMatch, MemoryVectorIndex, MetadataFilter, VectorIndex, VectorRecord};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Chat model that answers every prompt with the same reply (or fails).
pub struct ScriptedChat {
    reply: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedChat {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Wait `delay` before every reply.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_system(&self) -> String {
        self.prompts.lock().unwrap().last().map(|p| p.0.clone()).unwrap_or_default()
    }

    pub fn last_user(&self) -> String {
        self.prompts.lock().unwrap().last().map(|p| p.1.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        pause(self.delay).await;
        self.reply
            .clone()
            .ok_or_else(|| SvarError::OpenAI("scripted failure".into()))
    }
}

/// Cache backend that is never reachable.
pub struct UnreachableCache;

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn get(&self, _key: &str) -> Result<Option<serde_json::Value>> {
        Err(SvarError::CacheUnavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: &serde_json::Value, _ttl: Duration) -> Result<()> {
        Err(SvarError::CacheUnavailable("connection refused".into()))
    }

    async fn purge_expired(&self) -> Result<usize> {
        Err(SvarError::CacheUnavailable("connection refused".into()))
    }
}

/// Search hit for passage `id` of `video_id`, with source metadata.
pub fn candidate(id: &str, video_id: &str) -> CandidateMatch {
    let mut metadata = crate::vector_store::Metadata::new();
    metadata.insert("video_id".into(), json!(video_id));
    metadata.insert("start".into(), json!(0.0));
    CandidateMatch {
        id: id.to_string(),
        score: 0.5,
        metadata,
    }
}

/// Passage `id` starting at `start`, thirty seconds long.
pub fn passage(id: &str, video_id: &str, start: f64) -> Passage {
    Passage {
        id: id.to_string(),
        video_id: video_id.to_string(),
        start,
        end: start + 30.0,
        text: format!("text of {}", id),
    }
}

/// Passage store that records every fetch and can fail chosen batches.
pub struct FlakyPassageStore {
    passages: HashMap<String, Passage>,
    failing_on: Option<String>,
    delay: Duration,
    fetches: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl FlakyPassageStore {
    pub fn with_passages(passages: Vec<Passage>) -> Self {
        Self {
            passages: passages.into_iter().map(|p| (p.id.clone(), p)).collect(),
            failing_on: None,
            delay: Duration::ZERO,
            fetches: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Fail any batch that contains `id`.
    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing_on = Some(id.to_string());
        self
    }

    /// Wait `delay` before answering any batch.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PassageStore for FlakyPassageStore {
    async fn fetch_passages(&self, ids: &[String]) -> Result<Vec<Passage>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().extend(ids.iter().cloned());
        pause(self.delay).await;

        if let Some(bad) = &self.failing_on {
            if ids.contains(bad) {
                return Err(SvarError::PassageStore("connection reset".into()));
            }
        }
        Ok(ids.iter().filter_map(|id| self.passages.get(id).cloned()).collect())
    }

    async fn fetch_titles(&self, _video_ids: &[String]) -> Result<HashMap<String, String>> {
        Err(SvarError::PassageStore("titles unavailable".into()))
    }
}

/// Embedder returning one fixed vector for every text.
pub struct StubEmbedder {
    vector: Option<Vec<f32>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StubEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector: Some(vector),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            vector: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn model(&self) -> &str {
        "stub-embedding"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        pause(self.delay).await;
        self.vector
            .clone()
            .ok_or_else(|| SvarError::OpenAI("rate limited".into()))
    }
}

/// In-memory index that counts queries and can be switched to fail them.
pub struct CountingIndex {
    inner: MemoryVectorIndex,
    fail_queries: bool,
    queries: AtomicUsize,
}

impl CountingIndex {
    pub fn new() -> Self {
        Self {
            inner: MemoryVectorIndex::new(),
            fail_queries: false,
            queries: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_queries: true,
            ..Self::new()
        }
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for CountingIndex {
    async fn ensure_index(&self, dimension: usize) -> Result<()> {
        self.inner.ensure_index(dimension).await
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: &str,
        filter: Option<&MetadataFilter>,
        include_metadata: bool,
    ) -> Result<Vec<CandidateMatch>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries {
            return Err(SvarError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "index unreachable",
            )));
        }
        self.inner
            .query(vector, top_k, namespace, filter, include_metadata)
            .await
    }

    async fn upsert(&self, namespace: &str, records: &[VectorRecord]) -> Result<usize> {
        self.inner.upsert(namespace, records).await
    }
}

/// Generator that cites the first context block it is given.
pub struct CitingGenerator {
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl CitingGenerator {
    pub fn new() -> Self {
        Self {
            fail: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnswerGenerator for CitingGenerator {
    async fn generate(&self, _question: &str, contexts: &[String]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        pause(self.delay).await;
        if self.fail {
            return Err(SvarError::OpenAI("model overloaded".into()));
        }

        // Header is "[title | video_id | Ns]".
        let header = contexts
            .first()
            .and_then(|c| c.lines().next())
            .ok_or_else(|| SvarError::Generation("no context".into()))?;
        let fields: Vec<&str> = header.trim_matches(|c| c == '[' || c == ']').split(" | ").collect();

        Ok(format!("Per the video ({} @ {}).", fields[1], fields[2]))
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
