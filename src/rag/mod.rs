//! Grounded answer generation and source citations.

pub mod context;
mod generator;

pub use context::{ts_url, ContextBlock, Source};
pub use generator::{AnswerGenerator, GroundedGenerator};
