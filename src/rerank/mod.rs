//! Relevance reranking of similarity-search candidates.
//!
//! The judgment is made against the user's original question, not the
//! rewritten query. Whatever the reranker returns is validated here; when
//! nothing usable comes back the caller keeps similarity order.

use crate::config::Prompts;
use crate::error::{Result, SvarError};
use crate::llm::ChatModel;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::instrument;

/// Orders candidates by relevance.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Indices into `candidates`, best first, at most `keep` long.
    async fn rerank(&self, question: &str, candidates: &[String], keep: usize) -> Result<Vec<usize>>;
}

/// Reranker backed by a chat model that answers with a JSON index array.
pub struct LlmReranker {
    model: Arc<dyn ChatModel>,
    prompts: Prompts,
}

impl LlmReranker {
    pub fn new(model: Arc<dyn ChatModel>, prompts: Prompts) -> Self {
        Self { model, prompts }
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    #[instrument(skip(self, question, candidates), fields(candidates = candidates.len(), keep))]
    async fn rerank(&self, question: &str, candidates: &[String], keep: usize) -> Result<Vec<usize>> {
        if candidates.is_empty() || keep == 0 {
            return Ok(Vec::new());
        }

        let listing = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i, c))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("keep".to_string(), keep.to_string());
        vars.insert("candidates".to_string(), listing);

        let system = self.prompts.render_with_custom(&self.prompts.rerank.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.rerank.user, &vars);

        let raw = self
            .model
            .complete(&system, &user)
            .await
            .map_err(|e| SvarError::RerankFailed(e.to_string()))?;

        parse_indices(&raw)
    }
}

fn index_array() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[\s\d,]*\]").expect("static regex"))
}

/// Extract the first JSON integer array from a model reply.
pub fn parse_indices(raw: &str) -> Result<Vec<usize>> {
    let found = index_array()
        .find(raw)
        .ok_or_else(|| SvarError::RerankFailed(format!("No index array in reply: {:?}", raw)))?;

    serde_json::from_str(found.as_str())
        .map_err(|e| SvarError::RerankFailed(format!("Invalid index array: {}", e)))
}

/// In-range, de-duplicated prefix of `indices`, at most `keep` long.
///
/// Returns `None` when nothing usable remains.
pub fn valid_selection(indices: &[usize], len: usize, keep: usize) -> Option<Vec<usize>> {
    let mut selected: Vec<usize> = Vec::new();
    for &i in indices {
        if selected.len() == keep {
            break;
        }
        if i < len && !selected.contains(&i) {
            selected.push(i);
        }
    }
    (!selected.is_empty()).then_some(selected)
}

/// Similarity-order fallback: the first `keep` candidates.
pub fn similarity_order(len: usize, keep: usize) -> Vec<usize> {
    (0..len.min(keep)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedChat;

    #[test]
    fn test_parse_indices() {
        assert_eq!(parse_indices("[2, 0, 1]").unwrap(), vec![2, 0, 1]);
        assert_eq!(
            parse_indices("Most relevant first:\n```json\n[3,1]\n```").unwrap(),
            vec![3, 1]
        );
        assert_eq!(parse_indices("[]").unwrap(), Vec::<usize>::new());
        assert!(parse_indices("passage two is best").is_err());
    }

    #[test]
    fn test_valid_selection() {
        assert_eq!(valid_selection(&[4, 9, 4, 1, 0], 5, 3), Some(vec![4, 1, 0]));
        assert_eq!(valid_selection(&[7, 8], 5, 3), None);
        assert_eq!(valid_selection(&[], 5, 3), None);
    }

    #[test]
    fn test_similarity_order() {
        assert_eq!(similarity_order(5, 3), vec![0, 1, 2]);
        assert_eq!(similarity_order(2, 4), vec![0, 1]);
    }

    #[tokio::test]
    async fn test_llm_reranker_uses_original_question() {
        let chat = Arc::new(ScriptedChat::replying("[1, 0]"));
        let reranker = LlmReranker::new(chat.clone(), Prompts::default());

        let candidates = vec!["v1 @ 0s\nfirst".to_string(), "v1 @ 30s\nsecond".to_string()];
        let picked = reranker.rerank("why is my build slow?", &candidates, 2).await.unwrap();

        assert_eq!(picked, vec![1, 0]);
        assert!(chat.last_user().contains("why is my build slow?"));
        assert!(chat.last_user().contains("[1] v1 @ 30s"));
    }

    #[tokio::test]
    async fn test_llm_reranker_no_candidates() {
        let chat = Arc::new(ScriptedChat::replying("[0]"));
        let reranker = LlmReranker::new(chat.clone(), Prompts::default());

        assert!(reranker.rerank("q", &[], 3).await.unwrap().is_empty());
        assert_eq!(chat.calls(), 0);
    }
}
