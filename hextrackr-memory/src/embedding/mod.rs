//! Embedding provider seam
//!
//! The indexer only sees [`EmbeddingProvider`]. The bundled implementation
//! talks to a local Ollama-compatible HTTP endpoint; tests plug in
//! in-process fakes.

mod ollama;

pub use ollama::{OllamaEmbedder, OllamaEmbedderConfig};

use async_trait::async_trait;

use crate::error::Result;

/// Longest text (in characters) sent to a provider
pub const DEFAULT_MAX_EMBED_CHARS: usize = 8000;

/// Produces one vector per text
///
/// An `Err` is the "no vector" outcome: the caller skips the item and
/// carries on.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded in exports
    fn model_name(&self) -> &str;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Cut `text` to at most `max_chars` characters, marking the cut with "..."
pub fn truncate_for_embedding(text: &str, max_chars: usize) -> std::borrow::Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]).into(),
        None => text.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_borrowed_unchanged() {
        let out = truncate_for_embedding("hello world", 8000);
        assert!(matches!(out, std::borrow::Cow::Borrowed(_)));
        assert_eq!(out, "hello world");
    }

    #[test]
    fn test_long_text_is_cut_and_marked() {
        let text = "x".repeat(8005);
        let out = truncate_for_embedding(&text, 8000);
        assert_eq!(out.chars().count(), 8003);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_exact_length_is_not_cut() {
        let text = "é".repeat(10);
        assert_eq!(truncate_for_embedding(&text, 10), text);
    }
}
