//! File-backed vector store
//!
//! Holds every embedded record keyed by id and persists the whole map as a
//! single JSON document (`embeddings.json`). Writes are atomic.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{MemoryError, Result};
use crate::persist::{read_json_lenient, read_json_state, write_json_atomic, Loaded};
use crate::record::VectorRecord;

/// id → record store with atomic persistence
#[derive(Debug, Clone)]
pub struct VectorStore {
    path: PathBuf,
    records: BTreeMap<String, VectorRecord>,
}

impl VectorStore {
    /// Open the store at `path`, loading any prior state
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_checked(path).map(|(store, _)| store)
    }

    /// Like [`VectorStore::open`], also reporting whether an existing file
    /// was malformed and discarded
    pub fn open_checked(path: impl AsRef<Path>) -> Result<(Self, bool)> {
        let path = path.as_ref().to_path_buf();
        let (records, discarded) = match read_json_state(&path)? {
            Loaded::Parsed(records) => (records, false),
            Loaded::Missing => (BTreeMap::new(), false),
            Loaded::Malformed => (BTreeMap::new(), true),
        };
        if !records.is_empty() {
            log::info!("Loaded {} existing embeddings", records.len());
        }
        Ok((Self { path, records }, discarded))
    }

    /// Read persisted records
    ///
    /// A missing file is an empty store. A malformed file is logged and also
    /// treated as empty.
    pub fn load(path: &Path) -> Result<BTreeMap<String, VectorRecord>> {
        Ok(read_json_lenient(path)?.unwrap_or_default())
    }

    /// Check whether an id is already stored
    pub fn has(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    /// Get a record by id
    pub fn get(&self, id: &str) -> Option<&VectorRecord> {
        self.records.get(id)
    }

    /// Insert a new record
    ///
    /// Returns [`MemoryError::DuplicateId`] if the id is present; the existing
    /// record is left untouched. Callers treat that as "already processed".
    pub fn insert(&mut self, record: VectorRecord) -> Result<()> {
        if self.records.contains_key(&record.id) {
            return Err(MemoryError::DuplicateId(record.id));
        }
        self.records.insert(record.id.clone(), record);
        Ok(())
    }

    /// Atomically write the full store to disk
    pub fn persist(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.records)?;
        log::debug!("Saved {} embeddings to {}", self.records.len(), self.path.display());
        Ok(())
    }

    /// Iterate over records in id order
    pub fn records(&self) -> impl Iterator<Item = &VectorRecord> {
        self.records.values()
    }

    /// Owned copy of every record, for building off to the side
    pub fn snapshot(&self) -> Vec<VectorRecord> {
        self.records.values().cloned().collect()
    }

    /// Dimensionality established by the stored vectors
    pub fn dimensions(&self) -> Option<usize> {
        self.records.values().next().map(VectorRecord::dimensions)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
