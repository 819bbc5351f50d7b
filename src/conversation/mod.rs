//! Conversation memory owned by interactive callers.
//!
//! The pipeline only ever sees an immutable [`ConversationState`] snapshot;
//! keeping the message history and refreshing the running summary is the
//! caller's job (see [`SummaryUpdater`]).

mod summary;

pub use summary::{LlmSummaryUpdater, SummaryUpdater};

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Snapshot of the conversation passed into a single answer request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConversationState {
    /// Running summary of everything before the recent window.
    pub summary: String,
    /// Most recent messages, oldest first.
    pub recent_turns: Vec<Turn>,
}

impl ConversationState {
    /// Snapshot holding `summary` and the last `window` messages of `history`.
    pub fn snapshot(summary: &str, history: &[Turn], window: usize) -> Self {
        let start = history.len().saturating_sub(window);
        Self {
            summary: summary.to_string(),
            recent_turns: history[start..].to_vec(),
        }
    }

    /// True when there is nothing to resolve a follow-up question against.
    pub fn is_empty(&self) -> bool {
        self.summary.trim().is_empty() && self.recent_turns.is_empty()
    }
}

/// Render turns as `role: content` lines for prompts.
pub fn format_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_keeps_last_window() {
        let history: Vec<Turn> = (0..8)
            .map(|i| Turn::new(if i % 2 == 0 { Role::User } else { Role::Assistant }, format!("m{}", i)))
            .collect();

        let state = ConversationState::snapshot("sum", &history, 6);
        assert_eq!(state.recent_turns.len(), 6);
        assert_eq!(state.recent_turns[0].content, "m2");
        assert_eq!(state.summary, "sum");

        let short = ConversationState::snapshot("", &history[..2], 6);
        assert_eq!(short.recent_turns.len(), 2);
    }

    #[test]
    fn test_empty_state() {
        assert!(ConversationState::default().is_empty());
        assert!(ConversationState::snapshot("  ", &[], 6).is_empty());
        assert!(!ConversationState::snapshot("", &[Turn::new(Role::User, "hi")], 6).is_empty());
    }

    #[test]
    fn test_turn_wire_format() {
        let turn: Turn = serde_json::from_str(r#"{"role":"user","content":"hello"}"#).unwrap();
        assert_eq!(turn, Turn::new(Role::User, "hello"));
        assert_eq!(format_turns(&[turn]), "user: hello");
    }
}
