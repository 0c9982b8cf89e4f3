//! Append-only source logs
//!
//! The indexer watches two logs: chat evidence (a JSON array) and canonical
//! notes (a JSON object keyed by topic, in file order). Both are read in
//! full each cycle; the indexer slices off what it has already seen.

use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::record::{content_id, preview_of, RecordSource, SourceItem, DEFAULT_PREVIEW_CHARS};

/// A log the indexer can poll
pub trait SourceLog: Send + Sync {
    /// Which source tag items from this log carry
    fn source(&self) -> RecordSource;

    /// Read every item currently in the log, oldest first
    ///
    /// A log that does not exist yet reads as empty.
    fn read_all(&self) -> Result<Vec<SourceItem>>;
}

#[derive(Debug, Deserialize)]
struct EvidenceEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    topic_key: Option<String>,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct CanonicalNote {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    technical_details: Option<String>,
}

fn read_file(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Evidence log: `[{id, topic_key, text}, ...]`
#[derive(Debug, Clone)]
pub struct EvidenceLog {
    path: PathBuf,
}

impl EvidenceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceLog for EvidenceLog {
    fn source(&self) -> RecordSource {
        RecordSource::Evidence
    }

    fn read_all(&self) -> Result<Vec<SourceItem>> {
        let Some(content) = read_file(&self.path)? else {
            log::debug!("Waiting for evidence file {}", self.path.display());
            return Ok(Vec::new());
        };
        let entries: Vec<EvidenceEntry> = serde_json::from_str(&content)?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let id = entry
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| content_id(&entry.text));
                let topic_key = entry.topic_key.unwrap_or_default();
                SourceItem::new(id, topic_key, entry.text, RecordSource::Evidence)
            })
            .collect())
    }
}

/// Canonical notes: `{"topic:key": {title, summary, technical_details}, ...}`
#[derive(Debug, Clone)]
pub struct CanonicalNotesLog {
    path: PathBuf,
}

impl CanonicalNotesLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SourceLog for CanonicalNotesLog {
    fn source(&self) -> RecordSource {
        RecordSource::CanonicalNote
    }

    fn read_all(&self) -> Result<Vec<SourceItem>> {
        let Some(content) = read_file(&self.path)? else {
            return Ok(Vec::new());
        };
        // serde_json is built with preserve_order, so iteration follows the file
        let notes: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&content)?;

        let mut items = Vec::with_capacity(notes.len());
        for (topic_key, value) in notes {
            let note: CanonicalNote = serde_json::from_value(value)?;
            let title = note.title.unwrap_or_default();
            let summary = note.summary.unwrap_or_default();
            let details = note.technical_details.unwrap_or_default();

            let text = format!("{} {} {}", title, summary, details);
            let preview = if summary.is_empty() { &title } else { &summary };
            let preview = preview_of(preview, DEFAULT_PREVIEW_CHARS);

            items.push(
                SourceItem::new(
                    format!("canonical:{}", topic_key),
                    topic_key,
                    text,
                    RecordSource::CanonicalNote,
                )
                .with_preview(preview),
            );
        }
        Ok(items)
    }
}
