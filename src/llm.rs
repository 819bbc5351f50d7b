//! Chat-completion seam shared by the language-model stages.

use crate::error::{Result, SvarError};
use crate::openai::{openai_error, OpenAIClient};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// A single-shot chat model: system + user prompt in, text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, used in cache keys.
    fn model(&self) -> &str;

    /// Run one completion and return the message text.
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// OpenAI chat completions with deterministic sampling.
pub struct OpenAIChatModel {
    client: OpenAIClient,
    model: String,
    temperature: f32,
}

impl OpenAIChatModel {
    pub fn new(client: OpenAIClient, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
            temperature: 0.0,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()
                .map_err(|e| openai_error("Failed to build system message", e))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user.to_string())
                .build()
                .map_err(|e| openai_error("Failed to build user message", e))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| openai_error("Failed to build request", e))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| openai_error("Chat completion failed", e))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| SvarError::OpenAI("Empty response from LLM".to_string()))?
            .trim()
            .to_string();

        debug!("Completion returned {} chars", content.len());
        Ok(content)
    }
}
