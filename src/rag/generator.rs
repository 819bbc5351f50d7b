//! Grounded answer generation.

use super::context::BLOCK_SEPARATOR;
use crate::config::{Prompts, REFUSAL};
use crate::error::{Result, SvarError};
use crate::llm::ChatModel;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Produces the final answer from rendered context blocks.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, contexts: &[String]) -> Result<String>;
}

/// Generator that instructs a chat model to answer only from the context.
///
/// Grounding is enforced by the prompt alone; the model may still stray.
pub struct GroundedGenerator {
    model: Arc<dyn ChatModel>,
    prompts: Prompts,
}

impl GroundedGenerator {
    pub fn new(model: Arc<dyn ChatModel>, prompts: Prompts) -> Self {
        Self { model, prompts }
    }

    /// System and user prompt for `question` over `contexts`.
    pub fn build_prompt(&self, question: &str, contexts: &[String]) -> (String, String) {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), contexts.join(BLOCK_SEPARATOR));

        (
            self.prompts.render_with_custom(&self.prompts.answer.system, &vars),
            self.prompts.render_with_custom(&self.prompts.answer.user, &vars),
        )
    }
}

#[async_trait]
impl AnswerGenerator for GroundedGenerator {
    #[instrument(skip(self, question, contexts), fields(contexts = contexts.len()))]
    async fn generate(&self, question: &str, contexts: &[String]) -> Result<String> {
        if contexts.is_empty() {
            debug!("No context available, refusing without a model call");
            return Ok(REFUSAL.to_string());
        }

        let (system, user) = self.build_prompt(question, contexts);

        self.model
            .complete(&system, &user)
            .await
            .map(|answer| answer.trim().to_string())
            .map_err(|e| SvarError::Generation(e.to_string()))
    }
}
