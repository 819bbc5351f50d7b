//! Error types for Svar.

use thiserror::Error;

/// Library-level error type for Svar operations.
#[derive(Error, Debug)]
pub enum SvarError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Query rewrite failed: {0}")]
    RewriteFailed(String),

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector search failed: {0}")]
    Search(String),

    #[error("Passage store error: {0}")]
    PassageStore(String),

    #[error("Rerank failed: {0}")]
    RerankFailed(String),

    #[error("Answer generation failed: {0}")]
    Generation(String),

    #[error("Summary update failed: {0}")]
    Summary(String),

    #[error("Timed out after {secs}s during {stage}")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SvarError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SvarError::Config(_) => "config",
            SvarError::CacheUnavailable(_) => "cache_unavailable",
            SvarError::RewriteFailed(_) => "rewrite_failed",
            SvarError::Embedding(_) => "embedding_failed",
            SvarError::Search(_) => "search_failed",
            SvarError::PassageStore(_) => "passage_store",
            SvarError::RerankFailed(_) => "rerank_failed",
            SvarError::Generation(_) => "generation_failed",
            SvarError::Summary(_) => "summary_failed",
            SvarError::Timeout { .. } => "timeout",
            SvarError::Io(_) => "io",
            SvarError::Json(_) => "json",
            SvarError::TomlParse(_) => "toml",
            SvarError::Http(_) => "http",
            SvarError::Database(_) => "database",
            SvarError::OpenAI(_) => "openai",
            SvarError::InvalidInput(_) => "invalid_input",
        }
    }

    /// Whether retrying the same request may succeed.
    ///
    /// Infrastructure failures are transient; malformed input and
    /// configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            SvarError::Config(_)
                | SvarError::InvalidInput(_)
                | SvarError::TomlParse(_)
                | SvarError::Json(_)
        )
    }
}

/// Result type alias for Svar operations.
pub type Result<T> = std::result::Result<T, SvarError>;
