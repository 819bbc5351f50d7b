//! Svar - grounded answers from video transcripts
//!
//! A retrieval-answering pipeline over an ingested corpus of video
//! transcripts, with a layered cache that keeps repeated and overlapping
//! questions cheap.
//!
//! The name "Svar" is the Norwegian/Scandinavian word for "answer."
//!
//! # Overview
//!
//! Svar allows you to:
//! - Ask natural-language questions over transcript passages
//! - Carry a conversation, with follow-ups rewritten into standalone queries
//! - Get answers that cite videos with timestamped links
//! - Record per-stage latency and cache hits for offline evaluation
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management and prompt templates
//! - `cache` - TTL-keyed cache store with per-stage key builders
//! - `conversation` - Conversation snapshot and running summary
//! - `llm` - Chat-model seam shared by the language-model stages
//! - `rewrite` - Follow-up question rewriting
//! - `embedding` - Query embedding generation
//! - `vector_store` - Vector index abstraction
//! - `passage_store` - Passage and title lookup, with cached hydration
//! - `rerank` - Relevance reranking
//! - `rag` - Grounded answer generation and citations
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use svar::config::Settings;
//! use svar::orchestrator::{AnswerRequest, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let result = orchestrator
//!         .answer(&AnswerRequest::new("What does the video say about ownership?"))
//!         .await?;
//!     println!("{}", result.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod openai;
pub mod orchestrator;
pub mod passage_store;
pub mod rag;
pub mod rerank;
pub mod rewrite;
pub mod vector_store;

#[cfg(test)]
mod test_support;

pub use error::{Result, SvarError};
