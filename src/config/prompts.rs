//! Prompt templates for Svar.
//!
//! Prompts can be customized by placing TOML files in the custom prompts directory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Fixed answer the generator must emit when the context does not cover the question.
pub const REFUSAL: &str = "I don't know based on the video.";

/// Collection of all prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub rewrite: RewritePrompts,
    pub rerank: RerankPrompts,
    pub answer: AnswerPrompts,
    pub summary: SummaryPrompts,
    /// Custom variables from config, available in all prompts.
    #[serde(skip)]
    pub variables: HashMap<String, String>,
}

/// Prompts for turning a follow-up question into a standalone search query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewritePrompts {
    pub system: String,
    pub user: String,
}

impl Default for RewritePrompts {
    fn default() -> Self {
        Self {
            system: r#"You rewrite follow-up questions about video transcripts into standalone search queries.

Rules:
- Resolve pronouns and elliptical references using the conversation summary and recent turns
- Keep every concrete name, term and constraint from the question
- Do not answer the question
- Output only the rewritten query on a single line"#
                .to_string(),

            user: r#"Conversation summary:
{{summary}}

Recent turns:
{{turns}}

Question: {{question}}

Standalone search query:"#
                .to_string(),
        }
    }
}

/// Prompts for the relevance rerank judgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankPrompts {
    pub system: String,
    pub user: String,
}

impl Default for RerankPrompts {
    fn default() -> Self {
        Self {
            system: r#"You judge which transcript passages are most relevant to a user's question.

Respond with a JSON array of passage indices ordered from most to least relevant, for example [3, 0, 5].
Return at most the requested number of indices. Omit passages that are irrelevant."#
                .to_string(),

            user: r#"Question: {{question}}

Return at most {{keep}} indices.

Passages:
{{candidates}}"#
                .to_string(),
        }
    }
}

/// Prompts for grounded answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerPrompts {
    pub system: String,
    pub user: String,
}

impl Default for AnswerPrompts {
    fn default() -> Self {
        Self {
            system: format!(
                r#"You are a transcript-grounded assistant.
Use ONLY the provided context.
If context is insufficient, say: "{}"
Cite sources inline like (VIDEO_ID @ start_seconds)."#,
                REFUSAL
            ),

            user: r#"Question: {{question}}

Context:
{{context}}"#
                .to_string(),
        }
    }
}

/// Prompts for folding a new exchange into the running conversation summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryPrompts {
    pub system: String,
    pub user: String,
}

impl Default for SummaryPrompts {
    fn default() -> Self {
        Self {
            system: r#"You maintain a compact running summary of a conversation about video content.
Keep the topics, entities and open questions a follow-up question might refer to.
Output only the updated summary, at most {{max_chars}} characters."#
                .to_string(),

            user: r#"Current summary:
{{summary}}

New messages:
{{messages}}

Updated summary:"#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts from the default location, with optional custom directory and variables.
    pub fn load(
        custom_dir: Option<&str>,
        custom_variables: Option<&HashMap<String, String>>,
    ) -> crate::error::Result<Self> {
        let mut prompts = Prompts::default();

        if let Some(vars) = custom_variables {
            prompts.variables = vars.clone();
        }

        if let Some(dir) = custom_dir {
            let custom_path = PathBuf::from(shellexpand::tilde(dir).to_string());

            let rewrite_path = custom_path.join("rewrite.toml");
            if rewrite_path.exists() {
                prompts.rewrite = toml::from_str(&std::fs::read_to_string(&rewrite_path)?)?;
            }

            let rerank_path = custom_path.join("rerank.toml");
            if rerank_path.exists() {
                prompts.rerank = toml::from_str(&std::fs::read_to_string(&rerank_path)?)?;
            }

            let answer_path = custom_path.join("answer.toml");
            if answer_path.exists() {
                prompts.answer = toml::from_str(&std::fs::read_to_string(&answer_path)?)?;
            }

            let summary_path = custom_path.join("summary.toml");
            if summary_path.exists() {
                prompts.summary = toml::from_str(&std::fs::read_to_string(&summary_path)?)?;
            }
        }

        Ok(prompts)
    }

    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }

    /// Render a prompt template with both provided variables and custom config variables.
    /// Provided variables take precedence over custom config variables.
    pub fn render_with_custom(&self, template: &str, vars: &HashMap<String, String>) -> String {
        let mut merged = self.variables.clone();
        for (key, value) in vars {
            merged.insert(key.clone(), value.clone());
        }
        Self::render(template, &merged)
    }
}
