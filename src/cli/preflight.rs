//! Pre-flight checks before expensive operations.
//!
//! Validates that required configuration is available before starting
//! operations that would otherwise fail midway.

use crate::config::{Backend, Settings};
use crate::error::{Result, SvarError};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Answering questions needs the API key and the passage database.
    Ask,
    /// Cache maintenance has no external requirements.
    Cache,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    match operation {
        Operation::Ask => {
            check_api_key(std::env::var("OPENAI_API_KEY").ok().as_deref())?;
            check_corpus(settings)?;
        }
        Operation::Cache => {}
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key(key: Option<&str>) -> Result<()> {
    match key {
        Some(key) if !key.trim().is_empty() => Ok(()),
        Some(_) => Err(SvarError::Config(
            "OPENAI_API_KEY is empty. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
        None => Err(SvarError::Config(
            "OPENAI_API_KEY not set. Set it with: export OPENAI_API_KEY='sk-...'".to_string(),
        )),
    }
}

/// Check that the ingested corpus exists where the settings point.
fn check_corpus(settings: &Settings) -> Result<()> {
    let store = settings.store_path();
    if !store.exists() {
        return Err(SvarError::Config(format!(
            "Passage database not found at {}. Ingest transcripts first or set store.sqlite_path.",
            store.display()
        )));
    }

    if settings.index.provider == Backend::Sqlite && !settings.index_path().exists() {
        return Err(SvarError::Config(format!(
            "Vector index not found at {}. Ingest transcripts first or set index.sqlite_path.",
            settings.index_path().display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_cache_no_requirements() {
        assert!(check(Operation::Cache, &Settings::default()).is_ok());
    }

    #[test]
    fn test_api_key_must_be_set() {
        assert!(check_api_key(Some("sk-test")).is_ok());
        assert_eq!(check_api_key(Some("  ")).unwrap_err().kind(), "config");
        assert!(check_api_key(None).is_err());
    }

    #[test]
    fn test_missing_corpus_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.store.sqlite_path = dir.path().join("passages.db").display().to_string();
        settings.index.provider = Backend::Memory;

        let err = check_corpus(&settings).unwrap_err();
        assert!(err.to_string().contains("Passage database not found"));

        std::fs::write(dir.path().join("passages.db"), b"").unwrap();
        assert!(check_corpus(&settings).is_ok());
    }
}
