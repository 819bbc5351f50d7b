//! Interactive chat command with conversation memory.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::{Prompts, Settings};
use crate::conversation::{ConversationState, LlmSummaryUpdater, Role, SummaryUpdater, Turn};
use crate::llm::OpenAIChatModel;
use crate::openai::create_client;
use crate::orchestrator::{AnswerRequest, Orchestrator};
use anyhow::Result;
use console::style;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{debug, warn};

/// Run the interactive chat command.
pub async fn run_chat(namespace: Option<String>, videos: Vec<String>, settings: Settings) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let prompts = Prompts::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;
    let client = create_client(settings.pipeline.call_timeout())?;
    let summarizer = Arc::new(LlmSummaryUpdater::new(
        Arc::new(OpenAIChatModel::new(client, &settings.models.summary)),
        prompts,
    ));

    let mut session = ChatSession::new(
        summarizer,
        settings.conversation.recent_turns,
        settings.conversation.summary_max_chars,
    );
    let orchestrator = Orchestrator::new(settings)?;

    println!("\n{}", style("Svar Chat").bold().cyan());
    println!(
        "{}\n",
        style("Type your questions, or 'exit' to quit. Use 'clear' to reset conversation.").dim()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", style("You:").green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            break;
        }

        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            Output::info("Goodbye!");
            break;
        }

        if input.eq_ignore_ascii_case("clear") {
            session.clear();
            Output::info("Conversation history cleared.");
            continue;
        }

        let mut request = session.request(input).with_video_filter(videos.clone());
        request.namespace = namespace.clone();

        let spinner = Output::spinner("Thinking...");
        let result = orchestrator.answer(&request).await;
        spinner.finish_and_clear();

        match result {
            Ok(result) => {
                println!("\n{} {}", style("Svar:").cyan().bold(), result.answer);
                for (i, source) in result.sources.iter().enumerate() {
                    Output::source(i, source);
                }
                println!();
                session.record(input, &result.answer).await;
            }
            Err(e) => {
                Output::error(&format!("Error: {}", e));
            }
        }
    }

    Ok(())
}

/// Conversation memory for one chat session: the full message history and
/// a running summary maintained after every answer.
struct ChatSession {
    summarizer: Arc<dyn SummaryUpdater>,
    history: Vec<Turn>,
    summary: String,
    window: usize,
    summary_max_chars: usize,
}

impl ChatSession {
    fn new(summarizer: Arc<dyn SummaryUpdater>, window: usize, summary_max_chars: usize) -> Self {
        Self {
            summarizer,
            history: Vec::new(),
            summary: String::new(),
            window,
            summary_max_chars,
        }
    }

    /// Request for `question` carrying the summary and the recent window.
    fn request(&self, question: &str) -> AnswerRequest {
        AnswerRequest::new(question).with_conversation(ConversationState::snapshot(
            &self.summary,
            &self.history,
            self.window,
        ))
    }

    /// Append an exchange and fold it into the summary.
    ///
    /// A failed summary update keeps the previous summary.
    async fn record(&mut self, question: &str, answer: &str) {
        let exchange = [Turn::new(Role::User, question), Turn::new(Role::Assistant, answer)];

        match self
            .summarizer
            .update(&self.summary, &exchange, self.summary_max_chars)
            .await
        {
            Ok(summary) => {
                debug!("Summary now {} chars", summary.chars().count());
                self.summary = summary;
            }
            Err(e) => warn!("Keeping previous summary: {}", e),
        }

        self.history.extend(exchange);
    }

    fn clear(&mut self) {
        self.history.clear();
        self.summary.clear();
    }
}
