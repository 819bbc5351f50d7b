//! Configuration settings for Svar.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub store: StoreSettings,
    pub cache: CacheSettings,
    pub retrieval: RetrievalSettings,
    pub models: ModelSettings,
    pub pipeline: PipelineSettings,
    pub conversation: ConversationSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.svar".to_string(),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions requested from the model.
    pub dimensions: u32,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
        }
    }
}

/// Backend selection shared by the index and the cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    Memory,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "memory" => Ok(Backend::Memory),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Sqlite => write!(f, "sqlite"),
            Backend::Memory => write!(f, "memory"),
        }
    }
}

/// Vector index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Index backend (sqlite, memory).
    pub provider: Backend,
    /// Path to the SQLite index database.
    pub sqlite_path: String,
    /// Namespace used when a request does not name one.
    pub namespace: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            provider: Backend::Sqlite,
            sqlite_path: "~/.svar/index.db".to_string(),
            namespace: "default".to_string(),
        }
    }
}

/// Passage store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the SQLite database holding passages and videos.
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.svar/passages.db".to_string(),
        }
    }
}

/// Cache settings, including the per-stage TTL policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache backend (sqlite, memory).
    pub provider: Backend,
    /// Path to the SQLite cache database.
    pub sqlite_path: String,
    /// TTL for rewritten queries.
    pub rewrite_ttl_secs: u64,
    /// TTL for query embeddings.
    pub embedding_ttl_secs: u64,
    /// TTL for vector search results. Kept short since ingestion may update the index.
    pub retrieval_ttl_secs: u64,
    /// TTL for hydrated passages.
    pub passage_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            provider: Backend::Sqlite,
            sqlite_path: "~/.svar/cache.db".to_string(),
            rewrite_ttl_secs: 24 * 3600,
            embedding_ttl_secs: 30 * 24 * 3600,
            retrieval_ttl_secs: 15 * 60,
            passage_ttl_secs: 7 * 24 * 3600,
        }
    }
}

/// Retrieval breadth and context size.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of candidates requested from the vector index.
    pub fetch_k: usize,
    /// Maximum number of passages passed to generation.
    pub top_k: usize,
    /// Number of passages the reranker is asked to keep.
    pub rerank_top_n: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            fetch_k: 20,
            top_k: 4,
            rerank_top_n: 4,
        }
    }
}

impl RetrievalSettings {
    /// Keep-count handed to the reranker, never below one.
    pub fn keep_count(&self) -> usize {
        self.rerank_top_n.min(self.top_k).max(1)
    }
}

/// Chat models used by each language-model stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub rewrite: String,
    pub rerank: String,
    pub generation: String,
    pub summary: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            rewrite: "gpt-4o-mini".to_string(),
            rerank: "gpt-4o-mini".to_string(),
            generation: "gpt-4o-mini".to_string(),
            summary: "gpt-4o-mini".to_string(),
        }
    }
}

/// Pipeline execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Deadline applied independently to every external call.
    pub call_timeout_secs: u64,
    /// Maximum identifiers per passage store query.
    pub hydration_batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            call_timeout_secs: 60,
            hydration_batch_size: 100,
        }
    }
}

impl PipelineSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Conversation memory settings used by interactive callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationSettings {
    /// Number of most recent messages passed to the rewriter.
    pub recent_turns: usize,
    /// Upper bound on the running summary length.
    pub summary_max_chars: usize,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            recent_turns: 6,
            summary_max_chars: 1500,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |msg: &str| Err(crate::error::SvarError::Config(msg.to_string()));

        if self.retrieval.fetch_k == 0 {
            return invalid("retrieval.fetch_k must be at least 1");
        }
        if self.retrieval.top_k == 0 {
            return invalid("retrieval.top_k must be at least 1");
        }
        if self.retrieval.rerank_top_n == 0 {
            return invalid("retrieval.rerank_top_n must be at least 1");
        }
        if self.pipeline.call_timeout_secs == 0 {
            return invalid("pipeline.call_timeout_secs must be at least 1");
        }
        if self.pipeline.hydration_batch_size == 0 {
            return invalid("pipeline.hydration_batch_size must be at least 1");
        }
        if self.index.namespace.is_empty() {
            return invalid("index.namespace must not be empty");
        }
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("svar")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        Self::expand_path(&self.index.sqlite_path)
    }

    pub fn store_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }

    pub fn cache_path(&self) -> PathBuf {
        Self::expand_path(&self.cache.sqlite_path)
    }
}
