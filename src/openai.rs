//! OpenAI client configuration.

use crate::error::{Result, SvarError};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Shared OpenAI client type.
pub type OpenAIClient = Client<OpenAIConfig>;

/// Create an OpenAI client whose HTTP requests are bounded by `timeout`.
///
/// The pipeline applies its own per-stage deadline on top of this; the HTTP
/// timeout only keeps a stuck connection from outliving the stage.
pub fn create_client(timeout: Duration) -> Result<OpenAIClient> {
    let http_client = reqwest::Client::builder().timeout(timeout).build()?;

    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client))
}

pub(crate) fn openai_error(context: &str, err: impl std::fmt::Display) -> SvarError {
    SvarError::OpenAI(format!("{}: {}", context, err))
}
