//! Raw record and summary stores
//!
//! The pipeline reads raw records and writes summaries through these
//! traits. Each has an in-memory implementation and a JSON-file one.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::record::{ProjectSummaryRecord, ProvenanceLink, RawRecord, SummaryRecord};
use crate::error::Result;
use crate::persist::{read_json_lenient, write_json_atomic};

/// Read-only source of raw records
pub trait RawRecordStore: Send + Sync {
    fn all(&self) -> Result<Vec<RawRecord>>;

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.all()?.iter().any(|r| r.id == id))
    }
}

/// Destination for summary tiers and provenance links
pub trait SummaryStore: Send + Sync {
    fn insert_summary(&self, summary: SummaryRecord, links: Vec<ProvenanceLink>) -> Result<()>;
    fn summaries(&self) -> Result<Vec<SummaryRecord>>;
    fn links(&self) -> Result<Vec<ProvenanceLink>>;

    fn insert_project_summary(&self, summary: ProjectSummaryRecord) -> Result<()>;
    fn project_summaries(&self) -> Result<Vec<ProjectSummaryRecord>>;
    /// Delete every project summary for `project`, returning how many went
    fn remove_project_summaries(&self, project: &str) -> Result<usize>;
}

/// Raw records held in memory
#[derive(Debug, Default)]
pub struct MemoryRawRecordStore {
    records: RwLock<Vec<RawRecord>>,
}

impl MemoryRawRecordStore {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    pub fn push(&self, record: RawRecord) {
        self.records.write().push(record);
    }
}

impl RawRecordStore for MemoryRawRecordStore {
    fn all(&self) -> Result<Vec<RawRecord>> {
        Ok(self.records.read().clone())
    }

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.records.read().iter().any(|r| r.id == id))
    }
}

/// Raw records read from a JSON array file on every call
#[derive(Debug, Clone)]
pub struct JsonRawRecordStore {
    path: PathBuf,
}

impl JsonRawRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RawRecordStore for JsonRawRecordStore {
    fn all(&self) -> Result<Vec<RawRecord>> {
        Ok(read_json_lenient(&self.path)?.unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SummaryTiers {
    #[serde(default)]
    summaries: Vec<SummaryRecord>,
    #[serde(default)]
    project_summaries: Vec<ProjectSummaryRecord>,
    #[serde(default)]
    links: Vec<ProvenanceLink>,
}

/// Summary tiers held in memory
#[derive(Debug, Default)]
pub struct MemorySummaryStore {
    tiers: RwLock<SummaryTiers>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SummaryStore for MemorySummaryStore {
    fn insert_summary(&self, summary: SummaryRecord, links: Vec<ProvenanceLink>) -> Result<()> {
        let mut tiers = self.tiers.write();
        tiers.summaries.push(summary);
        tiers.links.extend(links);
        Ok(())
    }

    fn summaries(&self) -> Result<Vec<SummaryRecord>> {
        Ok(self.tiers.read().summaries.clone())
    }

    fn links(&self) -> Result<Vec<ProvenanceLink>> {
        Ok(self.tiers.read().links.clone())
    }

    fn insert_project_summary(&self, summary: ProjectSummaryRecord) -> Result<()> {
        self.tiers.write().project_summaries.push(summary);
        Ok(())
    }

    fn project_summaries(&self) -> Result<Vec<ProjectSummaryRecord>> {
        Ok(self.tiers.read().project_summaries.clone())
    }

    fn remove_project_summaries(&self, project: &str) -> Result<usize> {
        let mut tiers = self.tiers.write();
        let before = tiers.project_summaries.len();
        tiers.project_summaries.retain(|p| p.project != project);
        Ok(before - tiers.project_summaries.len())
    }
}

/// Summary tiers persisted to one JSON document after every write
#[derive(Debug)]
pub struct JsonSummaryStore {
    path: PathBuf,
    tiers: RwLock<SummaryTiers>,
}

impl JsonSummaryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tiers: SummaryTiers = read_json_lenient(&path)?.unwrap_or_default();
        Ok(Self {
            path,
            tiers: RwLock::new(tiers),
        })
    }

    /// Apply `change` to a copy, persist it, then swap it in
    fn update<T>(&self, change: impl FnOnce(&mut SummaryTiers) -> T) -> Result<T> {
        let mut tiers = self.tiers.write();
        let mut next = tiers.clone();
        let out = change(&mut next);
        write_json_atomic(&self.path, &next)?;
        *tiers = next;
        Ok(out)
    }
}

impl SummaryStore for JsonSummaryStore {
    fn insert_summary(&self, summary: SummaryRecord, links: Vec<ProvenanceLink>) -> Result<()> {
        self.update(|tiers| {
            tiers.summaries.push(summary);
            tiers.links.extend(links);
        })
    }

    fn summaries(&self) -> Result<Vec<SummaryRecord>> {
        Ok(self.tiers.read().summaries.clone())
    }

    fn links(&self) -> Result<Vec<ProvenanceLink>> {
        Ok(self.tiers.read().links.clone())
    }

    fn insert_project_summary(&self, summary: ProjectSummaryRecord) -> Result<()> {
        self.update(|tiers| tiers.project_summaries.push(summary))
    }

    fn project_summaries(&self) -> Result<Vec<ProjectSummaryRecord>> {
        Ok(self.tiers.read().project_summaries.clone())
    }

    fn remove_project_summaries(&self, project: &str) -> Result<usize> {
        self.update(|tiers| {
            let before = tiers.project_summaries.len();
            tiers.project_summaries.retain(|p| p.project != project);
            before - tiers.project_summaries.len()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn project_summary(id: &str, project: &str) -> ProjectSummaryRecord {
        ProjectSummaryRecord {
            id: id.to_string(),
            project: project.to_string(),
            summary_text: "overview".to_string(),
            batch_summary_count: 1,
            total_entries: 2,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_json_raw_store_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonRawRecordStore::new(dir.path().join("extended-memory.json"));
        assert!(store.all().unwrap().is_empty());
        assert!(!store.contains("em-1").unwrap());
    }

    #[test]
    fn test_remove_project_summaries() {
        let store = MemorySummaryStore::new();
        store.insert_project_summary(project_summary("p1", "HexTrackr")).unwrap();
        store.insert_project_summary(project_summary("p2", "rEngine")).unwrap();
        store.insert_project_summary(project_summary("p3", "HexTrackr")).unwrap();

        assert_eq!(store.remove_project_summaries("HexTrackr").unwrap(), 2);
        let remaining = store.project_summaries().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].project, "rEngine");
    }

    #[test]
    fn test_json_summary_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("summaries.json");

        let store = JsonSummaryStore::open(&path).unwrap();
        store.insert_project_summary(project_summary("p1", "HexTrackr")).unwrap();
        drop(store);

        let reopened = JsonSummaryStore::open(&path).unwrap();
        assert_eq!(reopened.project_summaries().unwrap().len(), 1);
        assert!(reopened.summaries().unwrap().is_empty());
    }

    #[test]
    fn test_json_summary_store_failed_write_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        let store = JsonSummaryStore::open(blocker.join("summaries.json")).unwrap();
        std::fs::write(&blocker, "x").unwrap();

        assert!(store.insert_project_summary(project_summary("p1", "HexTrackr")).is_err());
        assert!(store.project_summaries().unwrap().is_empty());
    }
}
