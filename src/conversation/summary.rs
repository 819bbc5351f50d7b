//! Running conversation summary maintenance.

use super::{format_turns, Turn};
use crate::config::Prompts;
use crate::error::{Result, SvarError};
use crate::llm::ChatModel;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Folds new messages into a running summary.
#[async_trait]
pub trait SummaryUpdater: Send + Sync {
    async fn update(&self, summary: &str, new_messages: &[Turn], max_chars: usize) -> Result<String>;
}

/// Summary updater backed by a chat model.
pub struct LlmSummaryUpdater {
    model: Arc<dyn ChatModel>,
    prompts: Prompts,
}

impl LlmSummaryUpdater {
    pub fn new(model: Arc<dyn ChatModel>, prompts: Prompts) -> Self {
        Self { model, prompts }
    }
}

#[async_trait]
impl SummaryUpdater for LlmSummaryUpdater {
    async fn update(&self, summary: &str, new_messages: &[Turn], max_chars: usize) -> Result<String> {
        if new_messages.is_empty() {
            return Ok(summary.to_string());
        }

        let mut vars = HashMap::new();
        vars.insert("summary".to_string(), summary.to_string());
        vars.insert("messages".to_string(), format_turns(new_messages));
        vars.insert("max_chars".to_string(), max_chars.to_string());

        let system = self.prompts.render_with_custom(&self.prompts.summary.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.summary.user, &vars);

        let updated = self
            .model
            .complete(&system, &user)
            .await
            .map_err(|e| SvarError::Summary(e.to_string()))?;

        Ok(truncate_chars(updated.trim(), max_chars))
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}
