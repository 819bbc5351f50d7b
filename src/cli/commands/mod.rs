//! CLI command implementations.

mod ask;
mod cache;
mod chat;
mod config;
mod eval;
mod serve;

pub use ask::run_ask;
pub use cache::run_cache;
pub use chat::run_chat;
pub use config::run_config;
pub use eval::run_eval;
pub use serve::run_serve;
