//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{AnswerRequest, Orchestrator};
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    namespace: Option<String>,
    videos: Vec<String>,
    json: bool,
    settings: Settings,
) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;

    let mut request = AnswerRequest::new(question).with_video_filter(videos);
    request.namespace = namespace;

    let spinner = (!json).then(|| Output::spinner("Searching transcripts..."));
    let result = orchestrator.answer(&request).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    match result {
        Ok(result) if json => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Ok(result) => {
            Output::pipeline_result(&result, true);
        }
        Err(e) => {
            Output::error(&format!("Failed to answer ({}): {}", e.kind(), e));
            return Err(e.into());
        }
    }

    Ok(())
}
