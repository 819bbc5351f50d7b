//! Query rewriting: turn a follow-up question into a standalone search query.

use crate::config::Prompts;
use crate::conversation::{format_turns, ConversationState};
use crate::error::{Result, SvarError};
use crate::llm::ChatModel;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Produces a context-independent search query.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    /// Model identifier, part of the rewrite cache key.
    fn model(&self) -> &str;

    /// Rewrite `question` against the conversation snapshot.
    async fn rewrite(
        &self,
        question: &str,
        namespace: &str,
        conversation: &ConversationState,
    ) -> Result<String>;
}

/// Rewriter backed by a chat model.
pub struct LlmRewriter {
    model: Arc<dyn ChatModel>,
    prompts: Prompts,
}

impl LlmRewriter {
    pub fn new(model: Arc<dyn ChatModel>, prompts: Prompts) -> Self {
        Self { model, prompts }
    }
}

#[async_trait]
impl QueryRewriter for LlmRewriter {
    fn model(&self) -> &str {
        self.model.model()
    }

    #[instrument(skip(self, conversation), fields(turns = conversation.recent_turns.len()))]
    async fn rewrite(
        &self,
        question: &str,
        namespace: &str,
        conversation: &ConversationState,
    ) -> Result<String> {
        // Nothing to resolve against: the question already stands alone.
        if conversation.is_empty() {
            return Ok(question.to_string());
        }

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("namespace".to_string(), namespace.to_string());
        vars.insert("summary".to_string(), conversation.summary.clone());
        vars.insert("turns".to_string(), format_turns(&conversation.recent_turns));

        let system = self.prompts.render_with_custom(&self.prompts.rewrite.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.rewrite.user, &vars);

        let raw = self
            .model
            .complete(&system, &user)
            .await
            .map_err(|e| SvarError::RewriteFailed(e.to_string()))?;

        let rewritten = clean_rewrite(&raw);
        if rewritten.is_empty() {
            debug!("Model returned an empty rewrite, keeping the question");
            return Ok(question.to_string());
        }
        Ok(rewritten)
    }
}

/// First non-empty line, without surrounding quotes or a "Query:" label.
fn clean_rewrite(raw: &str) -> String {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or_default();
    let line = line
        .strip_prefix("Standalone search query:")
        .or_else(|| line.strip_prefix("Query:"))
        .unwrap_or(line)
        .trim();
    line.trim_matches(|c| c == '"' || c == '\'').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{Role, Turn};
    use crate::test_support::ScriptedChat;

    #[test]
    fn test_clean_rewrite() {
        assert_eq!(clean_rewrite("\n  \"borrow checker rules\"  \nextra"), "borrow checker rules");
        assert_eq!(clean_rewrite("Query: lifetimes in Rust"), "lifetimes in Rust");
        assert_eq!(clean_rewrite("   "), "");
    }

    #[tokio::test]
    async fn test_no_context_skips_model() {
        let chat = Arc::new(ScriptedChat::replying("should not be used"));
        let rewriter = LlmRewriter::new(chat.clone(), Prompts::default());

        let out = rewriter
            .rewrite("What does the video say about traits?", "talks", &ConversationState::default())
            .await
            .unwrap();

        assert_eq!(out, "What does the video say about traits?");
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn test_context_is_sent_to_model() {
        let chat = Arc::new(ScriptedChat::replying("How do Rust traits differ from interfaces?"));
        let rewriter = LlmRewriter::new(chat.clone(), Prompts::default());
        let conversation = ConversationState {
            summary: "User is learning Rust traits.".into(),
            recent_turns: vec![Turn::new(Role::User, "What are traits?")],
        };

        let out = rewriter
            .rewrite("how do they differ from interfaces?", "talks", &conversation)
            .await
            .unwrap();

        assert_eq!(out, "How do Rust traits differ from interfaces?");
        assert!(chat.last_user().contains("User is learning Rust traits."));
        assert!(chat.last_user().contains("user: What are traits?"));
    }

    #[tokio::test]
    async fn test_model_failure_is_rewrite_error() {
        let chat = Arc::new(ScriptedChat::failing());
        let rewriter = LlmRewriter::new(chat, Prompts::default());
        let conversation = ConversationState {
            summary: "context".into(),
            recent_turns: vec![],
        };

        let err = rewriter.rewrite("and then?", "talks", &conversation).await.unwrap_err();
        assert_eq!(err.kind(), "rewrite_failed");
    }
}
