//! Vector record types
//!
//! Core types for the embedding index: where an item came from, the item as
//! read from a source log, and the embedded record kept in the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default number of characters kept in a record preview
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Topic used for records whose key has no non-empty segment
pub const UNCATEGORIZED_TOPIC: &str = "uncategorized";

/// Provenance tag of an indexed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Chat evidence extracted from sessions
    Evidence,
    /// Curated canonical note keyed by topic
    CanonicalNote,
}

impl RecordSource {
    /// All watched sources, in processing order
    pub const ALL: [RecordSource; 2] = [RecordSource::Evidence, RecordSource::CanonicalNote];

    /// Stable tag used in exports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evidence => "evidence",
            Self::CanonicalNote => "canonical_note",
        }
    }
}

impl std::fmt::Display for RecordSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item read from a source log, before embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    /// Stable id (source-assigned or content hash)
    pub id: String,
    /// Colon-delimited topic key
    pub topic_key: String,
    /// Full text sent to the embedding provider
    pub text: String,
    /// Preview stored with the record
    pub preview: String,
    /// Which log the item came from
    pub source: RecordSource,
}

impl SourceItem {
    /// Build an item whose preview is the leading slice of its text
    pub fn new(
        id: impl Into<String>,
        topic_key: impl Into<String>,
        text: impl Into<String>,
        source: RecordSource,
    ) -> Self {
        let text = text.into();
        let preview = preview_of(&text, DEFAULT_PREVIEW_CHARS);
        Self {
            id: id.into(),
            topic_key: topic_key.into(),
            text,
            preview,
            source,
        }
    }

    /// Override the preview text
    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = preview.into();
        self
    }
}

/// An embedded item held by the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    #[serde(rename = "embedding")]
    pub vector: Vec<f32>,
    pub topic_key: String,
    pub source: RecordSource,
    #[serde(rename = "text_preview")]
    pub text_preview: String,
    pub created_at: DateTime<Utc>,
}

impl VectorRecord {
    /// Create a record for an item that was just embedded
    pub fn from_item(item: &SourceItem, vector: Vec<f32>, preview_chars: usize) -> Self {
        Self {
            id: item.id.clone(),
            vector,
            topic_key: item.topic_key.clone(),
            source: item.source,
            text_preview: preview_of(&item.preview, preview_chars),
            created_at: Utc::now(),
        }
    }

    /// Vector dimensionality
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}

/// SHA-256 hex digest of a text, used as an id when the source has none
pub fn content_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{:x}", digest)
}

/// Take at most `max_chars` characters, respecting char boundaries
pub fn preview_of(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
