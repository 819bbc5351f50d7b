//! Configuration module for Svar.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AnswerPrompts, Prompts, RerankPrompts, RewritePrompts, SummaryPrompts, REFUSAL};
pub use settings::{
    Backend, CacheSettings, ConversationSettings, EmbeddingSettings, GeneralSettings,
    IndexSettings, ModelSettings, PipelineSettings, PromptSettings, RetrievalSettings, Settings,
    StoreSettings,
};
