//! CLI module for Svar.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Svar - answers from your video transcripts
///
/// Ask questions over an indexed transcript corpus and get grounded answers
/// with timestamped citations. The name "Svar" is Norwegian for "answer."
#[derive(Parser, Debug)]
#[command(name = "svar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask a single question
    Ask {
        /// The question to ask
        question: String,

        /// Index namespace (defaults to index.namespace)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Only search these video IDs (repeatable)
        #[arg(long = "video")]
        videos: Vec<String>,

        /// Print the full pipeline result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive chat session with conversation memory
    Chat {
        /// Index namespace (defaults to index.namespace)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Only search these video IDs (repeatable)
        #[arg(long = "video")]
        videos: Vec<String>,
    },

    /// Start HTTP API server for integration with other systems
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Run a test set through the pipeline and record answers and latencies
    Eval {
        /// JSON file with [{"question": ..., "ground_truth": ...}]
        testset: String,

        /// Write one JSON row per question to this file (JSON Lines)
        #[arg(short, long)]
        output: Option<String>,

        /// Index namespace (defaults to index.namespace)
        #[arg(short, long)]
        namespace: Option<String>,
    },

    /// Manage the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Remove expired cache entries
    Purge,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_filters() {
        let cli = Cli::parse_from([
            "svar", "-v", "ask", "what is a trait?", "--video", "v1", "--video", "v2", "--json",
        ]);

        assert_eq!(cli.verbose, 1);
        match cli.command {
            Commands::Ask {
                question,
                namespace,
                videos,
                json,
            } => {
                assert_eq!(question, "what is a trait?");
                assert_eq!(namespace, None);
                assert_eq!(videos, vec!["v1", "v2"]);
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_cache_purge() {
        let cli = Cli::parse_from(["svar", "--config", "/tmp/svar.toml", "cache", "purge"]);
        assert_eq!(cli.config.as_deref(), Some("/tmp/svar.toml"));
        assert!(matches!(cli.command, Commands::Cache { action: CacheAction::Purge }));
    }
}
