//! Pipeline orchestrator for Svar.
//!
//! Runs one answer request through the retrieval stages:
//!
//! ```text
//! Rewriting -> Embedding -> Searching -> Hydrating -> Reranking
//!           -> TitleResolving -> Generating -> Done
//! ```
//!
//! Stages run strictly in order. Rewriting, reranking and title resolution
//! degrade to a fallback on failure; embedding, searching, hydration (when
//! nothing at all is retrievable) and generation abort the request. Every
//! stage records its wall-clock time, and every cached stage records whether
//! it was served from the cache.

use crate::cache::{self, keys, Cache};
use crate::config::{Backend, Prompts, Settings, REFUSAL};
use crate::conversation::ConversationState;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{Result, SvarError};
use crate::llm::{ChatModel, OpenAIChatModel};
use crate::openai::create_client;
use crate::passage_store::{display_title, Passage, PassageStore, Hydrator, SqlitePassageStore};
use crate::rag::context::{candidate_text, ContextBlock, Source};
use crate::rag::{AnswerGenerator, GroundedGenerator};
use crate::rerank::{similarity_order, valid_selection, LlmReranker, Reranker};
use crate::rewrite::{LlmRewriter, QueryRewriter};
use crate::vector_store::{
    CandidateMatch, MemoryVectorIndex, MetadataFilter, SqliteVectorIndex, VectorIndex,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Rewriting,
    Embedding,
    Searching,
    Hydrating,
    Reranking,
    TitleResolving,
    Generating,
    Done,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Rewriting => "rewriting",
            Stage::Embedding => "embedding",
            Stage::Searching => "searching",
            Stage::Hydrating => "hydrating",
            Stage::Reranking => "reranking",
            Stage::TitleResolving => "title_resolving",
            Stage::Generating => "generating",
            Stage::Done => "done",
        }
    }

    /// Key of this stage in [`PipelineResult::timings`].
    pub fn timing_key(&self) -> &'static str {
        match self {
            Stage::Rewriting => "rewrite_ms",
            Stage::Embedding => "embed_query_ms",
            Stage::Searching => "retrieve_ms",
            Stage::Hydrating => "db_fetch_ms",
            Stage::Reranking => "rerank_ms",
            Stage::TitleResolving => "titles_ms",
            Stage::Generating => "generate_ms",
            Stage::Done => "total_ms",
        }
    }

    /// Key of this stage in [`PipelineResult::cache`], for cached stages.
    pub fn cache_key(&self) -> Option<&'static str> {
        match self {
            Stage::Rewriting => Some("rewrite_hit"),
            Stage::Embedding => Some("qembed_hit"),
            Stage::Searching => Some("retrieval_hit"),
            Stage::Hydrating => Some("passages_hit"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What a stage produced.
#[derive(Debug)]
pub enum StageOutcome<T> {
    Ok(T),
    /// The stage failed but its fallback value is usable.
    Degraded(T, String),
    Fatal(SvarError),
}

impl<T> StageOutcome<T> {
    /// Unwrap into a value, logging a degradation or surfacing a fatal error.
    pub fn resolve(self, stage: Stage) -> Result<T> {
        match self {
            StageOutcome::Ok(value) => Ok(value),
            StageOutcome::Degraded(value, reason) => {
                warn!(stage = %stage, "Stage degraded: {}", reason);
                Ok(value)
            }
            StageOutcome::Fatal(e) => Err(e),
        }
    }
}

impl<T> From<Result<T>> for StageOutcome<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(value) => StageOutcome::Ok(value),
            Err(e) => StageOutcome::Fatal(e),
        }
    }
}

/// A single question to answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    /// Index namespace; the configured default when absent.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Caller-owned conversation snapshot (`summary`, `recent_turns`).
    #[serde(flatten)]
    pub conversation: ConversationState,
    /// Restrict retrieval to these videos.
    #[serde(default)]
    pub video_filter: Option<Vec<String>>,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_conversation(mut self, conversation: ConversationState) -> Self {
        self.conversation = conversation;
        self
    }

    pub fn with_video_filter(mut self, video_ids: Vec<String>) -> Self {
        self.video_filter = Some(video_ids);
        self
    }
}

/// Structured result of one answer request.
///
/// This is the wire shape returned by `svar serve` and consumed by `svar eval`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineResult {
    pub rewritten_query: String,
    pub answer: String,
    pub sources: Vec<Source>,
    /// Stage name -> elapsed milliseconds.
    pub timings: BTreeMap<String, f64>,
    /// Stage name -> served from cache.
    pub cache: BTreeMap<String, bool>,
    pub retrieved_candidates: usize,
    pub used_context: usize,
    /// Exact context blocks given to generation.
    pub contexts_used: Vec<String>,
}

/// Collaborators the orchestrator is assembled from.
pub struct Components {
    pub cache: Cache,
    pub rewriter: Arc<dyn QueryRewriter>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub passages: Arc<dyn PassageStore>,
    pub reranker: Arc<dyn Reranker>,
    pub generator: Arc<dyn AnswerGenerator>,
}

/// Per-request timing and cache bookkeeping.
#[derive(Default)]
struct Trace {
    timings: BTreeMap<String, f64>,
    cache: BTreeMap<String, bool>,
}

impl Trace {
    fn time(&mut self, stage: Stage, started: Instant) {
        self.timings.insert(
            stage.timing_key().to_string(),
            started.elapsed().as_secs_f64() * 1000.0,
        );
    }

    fn hit(&mut self, stage: Stage, hit: bool) {
        if let Some(key) = stage.cache_key() {
            self.cache.insert(key.to_string(), hit);
        }
    }
}

/// The main orchestrator for the Svar pipeline.
pub struct Orchestrator {
    settings: Settings,
    cache: Cache,
    rewriter: Arc<dyn QueryRewriter>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    passages: Arc<dyn PassageStore>,
    hydrator: Hydrator,
    reranker: Arc<dyn Reranker>,
    generator: Arc<dyn AnswerGenerator>,
    /// Dimension the index was prepared for, set on first search.
    index_dimension: OnceCell<usize>,
}

impl Orchestrator {
    /// Create an orchestrator backed by OpenAI and the configured stores.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let client = create_client(settings.pipeline.call_timeout())?;
        let chat = |model: &str| -> Arc<dyn ChatModel> {
            Arc::new(OpenAIChatModel::new(client.clone(), model))
        };

        let cache_store = match cache::open_store(&settings.cache) {
            Ok(store) => store,
            Err(e) => {
                warn!("Cache backend unavailable, continuing with an in-process cache: {}", e);
                Arc::new(cache::MemoryCache::new())
            }
        };

        let index: Arc<dyn VectorIndex> = match settings.index.provider {
            Backend::Sqlite => Arc::new(SqliteVectorIndex::new(&settings.index_path())?),
            Backend::Memory => Arc::new(MemoryVectorIndex::new()),
        };

        info!(
            "Using {} index, {} cache, generation model {}",
            settings.index.provider, settings.cache.provider, settings.models.generation
        );

        let components = Components {
            cache: Cache::new(cache_store),
            rewriter: Arc::new(LlmRewriter::new(chat(&settings.models.rewrite), prompts.clone())),
            embedder: Arc::new(OpenAIEmbedder::new(
                client.clone(),
                &settings.embedding.model,
                settings.embedding.dimensions as usize,
            )),
            index,
            passages: Arc::new(SqlitePassageStore::new(&settings.store_path())?),
            reranker: Arc::new(LlmReranker::new(chat(&settings.models.rerank), prompts.clone())),
            generator: Arc::new(GroundedGenerator::new(chat(&settings.models.generation), prompts)),
        };

        Ok(Self::with_components(settings, components))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(settings: Settings, components: Components) -> Self {
        let hydrator = Hydrator::new(
            components.cache.clone(),
            components.passages.clone(),
            Duration::from_secs(settings.cache.passage_ttl_secs),
            settings.pipeline.hydration_batch_size,
            settings.pipeline.call_timeout(),
        );

        Self {
            settings,
            cache: components.cache,
            rewriter: components.rewriter,
            embedder: components.embedder,
            index: components.index,
            passages: components.passages,
            hydrator,
            reranker: components.reranker,
            generator: components.generator,
            index_dimension: OnceCell::new(),
        }
    }

    /// Get the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Answer a question against the transcript corpus.
    pub async fn answer(&self, request: &AnswerRequest) -> Result<PipelineResult> {
        if request.question.trim().is_empty() {
            return Err(SvarError::InvalidInput("Question must not be empty".to_string()));
        }

        let namespace = request
            .namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(&self.settings.index.namespace);

        let filter = request
            .video_filter
            .as_ref()
            .filter(|ids| !ids.is_empty())
            .map(|ids| MetadataFilter::video_ids(ids.clone()));

        let span = info_span!("answer", request_id = %Uuid::new_v4(), namespace = %namespace);
        self.run(&request.question, namespace, &request.conversation, filter.as_ref())
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        question: &str,
        namespace: &str,
        conversation: &ConversationState,
        filter: Option<&MetadataFilter>,
    ) -> Result<PipelineResult> {
        let started = Instant::now();
        let mut trace = Trace::default();

        let t = Instant::now();
        let rewritten = self
            .rewrite(question, namespace, conversation, &mut trace)
            .await
            .resolve(Stage::Rewriting)?;
        trace.time(Stage::Rewriting, t);

        let t = Instant::now();
        let vector = self
            .embed(&rewritten, &mut trace)
            .await
            .resolve(Stage::Embedding)?;
        trace.time(Stage::Embedding, t);

        let t = Instant::now();
        let candidates = self
            .search(&rewritten, &vector, namespace, filter, &mut trace)
            .await
            .resolve(Stage::Searching)?;
        trace.time(Stage::Searching, t);

        let t = Instant::now();
        let passages = self
            .hydrate(&candidates, &mut trace)
            .await
            .resolve(Stage::Hydrating)?;
        trace.time(Stage::Hydrating, t);

        let t = Instant::now();
        let selected: Vec<Passage> = self
            .rerank(question, &passages)
            .await
            .resolve(Stage::Reranking)?
            .into_iter()
            .map(|i| passages[i].clone())
            .collect();
        trace.time(Stage::Reranking, t);

        let t = Instant::now();
        let titles = self
            .resolve_titles(&selected)
            .await
            .resolve(Stage::TitleResolving)?;
        trace.time(Stage::TitleResolving, t);

        let t = Instant::now();
        let mut contexts_used = Vec::with_capacity(selected.len());
        let mut sources = Vec::with_capacity(selected.len());
        for passage in &selected {
            let title = display_title(&titles, &passage.video_id);
            contexts_used.push(ContextBlock::new(passage, &title).render());
            sources.push(Source::new(passage, &title));
        }
        let answer = self
            .generate(question, &contexts_used)
            .await
            .resolve(Stage::Generating)?;
        trace.time(Stage::Generating, t);

        trace.time(Stage::Done, started);
        info!(
            candidates = candidates.len(),
            used = selected.len(),
            total_ms = trace.timings.get(Stage::Done.timing_key()).copied().unwrap_or_default(),
            "Answered question"
        );

        Ok(PipelineResult {
            rewritten_query: rewritten,
            answer,
            sources,
            timings: trace.timings,
            cache: trace.cache,
            retrieved_candidates: candidates.len(),
            used_context: selected.len(),
            contexts_used,
        })
    }

    /// Run one external call under the per-call deadline.
    async fn bounded<T>(&self, stage: Stage, call: impl Future<Output = Result<T>>) -> Result<T> {
        let limit = self.settings.pipeline.call_timeout();
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| SvarError::Timeout {
                stage: stage.name(),
                secs: limit.as_secs(),
            })?
    }

    #[instrument(skip_all)]
    async fn rewrite(
        &self,
        question: &str,
        namespace: &str,
        conversation: &ConversationState,
        trace: &mut Trace,
    ) -> StageOutcome<String> {
        let key = keys::rewrite_key(
            self.rewriter.model(),
            namespace,
            question,
            &conversation.summary,
            &conversation.recent_turns,
        );

        if let Some(cached) = self.cache.get::<String>(&key).await {
            trace.hit(Stage::Rewriting, true);
            return StageOutcome::Ok(cached);
        }
        trace.hit(Stage::Rewriting, false);

        let call = self.rewriter.rewrite(question, namespace, conversation);
        match self.bounded(Stage::Rewriting, call).await {
            Ok(rewritten) => {
                debug!("Rewrote query to {:?}", rewritten);
                let ttl = Duration::from_secs(self.settings.cache.rewrite_ttl_secs);
                self.cache.set(&key, &rewritten, ttl).await;
                StageOutcome::Ok(rewritten)
            }
            Err(e) => StageOutcome::Degraded(
                question.to_string(),
                format!("rewrite unavailable, using the question as is: {}", e),
            ),
        }
    }

    #[instrument(skip_all)]
    async fn embed(&self, query: &str, trace: &mut Trace) -> StageOutcome<Vec<f32>> {
        let key = keys::embedding_key(self.embedder.model(), query);

        if let Some(cached) = self.cache.get::<Vec<f32>>(&key).await {
            trace.hit(Stage::Embedding, true);
            return StageOutcome::Ok(cached);
        }
        trace.hit(Stage::Embedding, false);

        let result = self
            .bounded(Stage::Embedding, self.embedder.embed(query))
            .await
            .map_err(|e| match e {
                SvarError::Embedding(_) | SvarError::Timeout { .. } => e,
                other => SvarError::Embedding(other.to_string()),
            });

        if let Ok(vector) = &result {
            let ttl = Duration::from_secs(self.settings.cache.embedding_ttl_secs);
            self.cache.set(&key, vector, ttl).await;
        }
        result.into()
    }

    #[instrument(skip_all, fields(fetch_k = self.settings.retrieval.fetch_k))]
    async fn search(
        &self,
        query: &str,
        vector: &[f32],
        namespace: &str,
        filter: Option<&MetadataFilter>,
        trace: &mut Trace,
    ) -> StageOutcome<Vec<CandidateMatch>> {
        let fetch_k = self.settings.retrieval.fetch_k;
        let key = keys::retrieval_key(self.embedder.model(), namespace, query, fetch_k, filter);

        if let Some(cached) = self.cache.get::<Vec<CandidateMatch>>(&key).await {
            trace.hit(Stage::Searching, true);
            return StageOutcome::Ok(cached);
        }
        trace.hit(Stage::Searching, false);

        let result = self
            .query_index(vector, fetch_k, namespace, filter)
            .await
            .map_err(|e| match e {
                SvarError::Search(_) | SvarError::Timeout { .. } => e,
                other => SvarError::Search(other.to_string()),
            });

        if let Ok(candidates) = &result {
            debug!("Retrieved {} candidates", candidates.len());
            let ttl = Duration::from_secs(self.settings.cache.retrieval_ttl_secs);
            self.cache.set(&key, candidates, ttl).await;
        }
        result.into()
    }

    /// Size the index on first use, then query it.
    async fn query_index(
        &self,
        vector: &[f32],
        fetch_k: usize,
        namespace: &str,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<CandidateMatch>> {
        self.index_dimension
            .get_or_try_init(|| async {
                self.bounded(Stage::Searching, self.index.ensure_index(vector.len()))
                    .await
                    .map(|_| vector.len())
            })
            .await?;

        self.bounded(
            Stage::Searching,
            self.index.query(vector, fetch_k, namespace, filter, true),
        )
        .await
    }

    async fn hydrate(&self, candidates: &[CandidateMatch], trace: &mut Trace) -> StageOutcome<Vec<Passage>> {
        match self.hydrator.hydrate(candidates).await {
            Ok(hydration) => {
                trace.hit(Stage::Hydrating, hydration.fully_cached());
                if hydration.missing.is_empty() {
                    StageOutcome::Ok(hydration.passages)
                } else {
                    let reason = format!(
                        "{} passage(s) unavailable, kept as empty placeholders",
                        hydration.missing.len()
                    );
                    StageOutcome::Degraded(hydration.passages, reason)
                }
            }
            Err(e) => {
                trace.hit(Stage::Hydrating, false);
                StageOutcome::Fatal(e)
            }
        }
    }

    /// Indices of the passages to keep, best first.
    #[instrument(skip_all, fields(candidates = passages.len()))]
    async fn rerank(&self, question: &str, passages: &[Passage]) -> StageOutcome<Vec<usize>> {
        let keep = self.settings.retrieval.keep_count();
        if passages.is_empty() {
            return StageOutcome::Ok(Vec::new());
        }

        let fallback = similarity_order(passages.len(), keep);
        let candidates: Vec<String> = passages.iter().map(candidate_text).collect();

        match self
            .bounded(Stage::Reranking, self.reranker.rerank(question, &candidates, keep))
            .await
        {
            Ok(indices) => match valid_selection(&indices, passages.len(), keep) {
                Some(selected) => StageOutcome::Ok(selected),
                None => StageOutcome::Degraded(
                    fallback,
                    format!("reranker returned no usable indices ({:?}), keeping similarity order", indices),
                ),
            },
            Err(e) => StageOutcome::Degraded(
                fallback,
                format!("reranker failed, keeping similarity order: {}", e),
            ),
        }
    }

    async fn resolve_titles(&self, passages: &[Passage]) -> StageOutcome<HashMap<String, String>> {
        let mut video_ids: Vec<String> = Vec::new();
        for passage in passages {
            if !passage.video_id.is_empty() && !video_ids.contains(&passage.video_id) {
                video_ids.push(passage.video_id.clone());
            }
        }
        if video_ids.is_empty() {
            return StageOutcome::Ok(HashMap::new());
        }

        match self
            .bounded(Stage::TitleResolving, self.passages.fetch_titles(&video_ids))
            .await
        {
            Ok(titles) => StageOutcome::Ok(titles),
            Err(e) => StageOutcome::Degraded(
                HashMap::new(),
                format!("title lookup failed, using default titles: {}", e),
            ),
        }
    }

    #[instrument(skip_all, fields(contexts = contexts.len()))]
    async fn generate(&self, question: &str, contexts: &[String]) -> StageOutcome<String> {
        if contexts.is_empty() {
            debug!("No context retrieved, refusing");
            return StageOutcome::Ok(REFUSAL.to_string());
        }

        self.bounded(Stage::Generating, self.generator.generate(question, contexts))
            .await
            .map_err(|e| match e {
                SvarError::Generation(_) | SvarError::Timeout { .. } => e,
                other => SvarError::Generation(other.to_string()),
            })
            .into()
    }
}
