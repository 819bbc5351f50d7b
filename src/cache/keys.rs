//! Cache key construction.
//!
//! Every key is a pure function of a stage prefix, the model identifier, a
//! content hash and the stage's parameters, so identical inputs always look up
//! the identical key.

use crate::conversation::Turn;
use crate::vector_store::MetadataFilter;
use sha2::{Digest, Sha256};

/// Filter component used when a search is unfiltered.
pub const NO_FILTER: &str = "nofilter";

/// Hex SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Key for a rewritten query.
///
/// The summary and every turn are part of the hash so the same question in
/// two different conversations never shares an entry.
pub fn rewrite_key(
    model: &str,
    namespace: &str,
    question: &str,
    summary: &str,
    turns: &[Turn],
) -> String {
    let material = serde_json::json!({
        "question": question,
        "summary": summary,
        "turns": turns,
    });
    format!(
        "rewrite:{}:{}:{}",
        model,
        namespace,
        content_hash(&material.to_string())
    )
}

/// Key for a text embedding.
pub fn embedding_key(model: &str, text: &str) -> String {
    format!("qembed:{}:{}", model, content_hash(text))
}

/// Key for a vector search result set.
pub fn retrieval_key(
    model: &str,
    namespace: &str,
    query: &str,
    fetch_k: usize,
    filter: Option<&MetadataFilter>,
) -> String {
    let filter_hash = filter
        .map(|f| content_hash(&f.canonical_json()))
        .unwrap_or_else(|| NO_FILTER.to_string());
    format!(
        "retr:{}:{}:{}:{}:{}",
        model,
        namespace,
        content_hash(query),
        fetch_k,
        filter_hash
    )
}

/// Key for a single hydrated passage.
pub fn passage_key(passage_id: &str) -> String {
    format!("passage:{}", passage_id)
}

/// Key with any trailing hash shortened, for log fields.
pub fn key_prefix(key: &str) -> &str {
    let end = key
        .char_indices()
        .nth(48)
        .map(|(i, _)| i)
        .unwrap_or(key.len());
    &key[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;

    #[test]
    fn test_keys_are_deterministic() {
        let a = embedding_key("text-embedding-3-small", "what is a monad?");
        let b = embedding_key("text-embedding-3-small", "what is a monad?");
        assert_eq!(a, b);
        assert!(a.starts_with("qembed:text-embedding-3-small:"));

        let other_model = embedding_key("text-embedding-3-large", "what is a monad?");
        assert_ne!(a, other_model);
    }

    #[test]
    fn test_rewrite_key_depends_on_context() {
        let turns = vec![Turn::new(Role::User, "tell me about rust")];
        let bare = rewrite_key("m", "ns", "what about it?", "", &[]);
        let with_turns = rewrite_key("m", "ns", "what about it?", "", &turns);
        let with_summary = rewrite_key("m", "ns", "what about it?", "talked about go", &[]);

        assert_ne!(bare, with_turns);
        assert_ne!(bare, with_summary);
        assert_eq!(with_turns, rewrite_key("m", "ns", "what about it?", "", &turns));
    }

    #[test]
    fn test_retrieval_key_parameters() {
        let filter = MetadataFilter::video_ids(vec!["b".into(), "a".into()]);
        let reordered = MetadataFilter::video_ids(vec!["a".into(), "b".into()]);

        let unfiltered = retrieval_key("m", "ns", "q", 20, None);
        assert!(unfiltered.ends_with(":20:nofilter"));

        let filtered = retrieval_key("m", "ns", "q", 20, Some(&filter));
        assert_ne!(unfiltered, filtered);
        assert_eq!(filtered, retrieval_key("m", "ns", "q", 20, Some(&reordered)));
        assert_ne!(filtered, retrieval_key("m", "ns", "q", 40, Some(&filter)));
        assert_ne!(filtered, retrieval_key("m", "other", "q", 20, Some(&filter)));
    }

    #[test]
    fn test_passage_key() {
        assert_eq!(passage_key("abc-1"), "passage:abc-1");
    }

    #[test]
    fn test_key_prefix_truncates() {
        let key = embedding_key("m", "text");
        assert_eq!(key_prefix(&key).len(), 48);
        assert_eq!(key_prefix("short"), "short");
    }
}
