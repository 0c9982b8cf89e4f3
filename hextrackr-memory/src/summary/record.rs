//! Summary tier record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A raw memory record, as written by the extended-memory indexer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: String,
    #[serde(alias = "searchableText")]
    pub text: String,
    #[serde(alias = "projectContext", default)]
    pub project: String,
    #[serde(alias = "messageType", default)]
    pub message_type: String,
    #[serde(default)]
    pub importance: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "semanticKeywords", default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportanceRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

/// Summary of one batch of raw records. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub id: String,
    pub batch_index: usize,
    pub entry_count: usize,
    pub summary_text: String,
    pub source_projects: BTreeSet<String>,
    pub message_types: BTreeSet<String>,
    pub importance_range: ImportanceRange,
    pub time_range: TimeRange,
    /// Raw record ids, in batch order
    pub source_entry_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate over every batch summary tagged with one project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummaryRecord {
    pub id: String,
    pub project: String,
    pub summary_text: String,
    pub batch_summary_count: usize,
    pub total_entries: usize,
    pub created_at: DateTime<Utc>,
}

/// "summary summarizes raw record" relation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProvenanceLink {
    pub summary_id: String,
    pub source_record_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_record_accepts_indexer_field_names() {
        let json = r#"{
            "id": "em-1",
            "searchableText": "fixed the cache",
            "projectContext": "HexTrackr",
            "messageType": "bug_fix",
            "importance": 4,
            "timestamp": "2025-08-20T10:00:00Z",
            "semanticKeywords": ["cache"]
        }"#;
        let record: RawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.text, "fixed the cache");
        assert_eq!(record.project, "HexTrackr");
        assert_eq!(record.message_type, "bug_fix");
        assert_eq!(record.importance, 4);
        assert_eq!(record.keywords, vec!["cache".to_string()]);
    }
}
