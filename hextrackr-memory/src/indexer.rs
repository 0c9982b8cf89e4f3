//! Incremental indexer
//!
//! Polls the watched source logs, embeds items past each source's cursor,
//! and rebuilds the similarity matrix and exports when anything changed.
//!
//! All mutable state lives in [`IndexState`], which the caller owns and
//! passes into every cycle. Embedding calls are issued one at a time with a
//! fixed delay between them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::embedding::{truncate_for_embedding, EmbeddingProvider, DEFAULT_MAX_EMBED_CHARS};
use crate::error::{MemoryError, Result};
use crate::export::ConsolidatedView;
use crate::persist::{read_json_lenient, write_json_atomic};
use crate::record::{RecordSource, SourceItem, VectorRecord, DEFAULT_PREVIEW_CHARS};
use crate::similarity::{SimilarityMatrix, SimilarityMatrixBuilder, DEFAULT_SIMILARITY_THRESHOLD};
use crate::source::SourceLog;
use crate::storage::VectorStore;

pub const EMBEDDINGS_FILE: &str = "embeddings.json";
pub const SEARCH_MATRIX_FILE: &str = "search-matrix.json";
pub const CONSOLIDATED_FILE: &str = "consolidated-matrix.json";
pub const INDEX_STATE_FILE: &str = "index-state.json";

/// Indexer tuning
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub threshold: f64,
    /// Pause after every provider call
    pub request_delay: Duration,
    pub max_text_chars: usize,
    /// Total embedding attempts per item, including the first
    pub max_embed_attempts: u32,
    pub preview_chars: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
            request_delay: Duration::from_millis(100),
            max_text_chars: DEFAULT_MAX_EMBED_CHARS,
            max_embed_attempts: 3,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }
}

/// An item whose embedding failed and may be retried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    pub item: SourceItem,
    pub attempts: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedProgress {
    #[serde(default)]
    cursors: BTreeMap<RecordSource, usize>,
    #[serde(default)]
    failed: BTreeMap<String, FailedItem>,
}

/// Everything one indexing cycle reads and writes
#[derive(Debug)]
pub struct IndexState {
    export_dir: PathBuf,
    store: VectorStore,
    matrix: SimilarityMatrix,
    cursors: BTreeMap<RecordSource, usize>,
    failed: BTreeMap<String, FailedItem>,
    dirty: bool,
}

impl IndexState {
    /// Load prior exports from `export_dir`, or start empty
    pub fn open(export_dir: impl AsRef<Path>, threshold: f64) -> Result<Self> {
        let export_dir = export_dir.as_ref().to_path_buf();
        let (store, discarded) = VectorStore::open_checked(export_dir.join(EMBEDDINGS_FILE))?;
        let mut matrix = read_json_lenient(&export_dir.join(SEARCH_MATRIX_FILE))?
            .unwrap_or_else(|| SimilarityMatrix::empty(store.len(), threshold, None));
        let mut progress: PersistedProgress =
            read_json_lenient(&export_dir.join(INDEX_STATE_FILE))?.unwrap_or_default();

        // cursors past items the store no longer holds would skip them forever
        if discarded {
            log::warn!(
                "Embeddings in {} were unreadable; re-indexing every source from the start",
                export_dir.display()
            );
            progress = PersistedProgress::default();
            matrix = SimilarityMatrix::empty(0, threshold, None);
        }

        if !progress.cursors.is_empty() {
            log::info!("Resuming from cursors {:?}", progress.cursors);
        }

        Ok(Self {
            export_dir,
            store,
            matrix,
            cursors: progress.cursors,
            failed: progress.failed,
            dirty: false,
        })
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn matrix(&self) -> &SimilarityMatrix {
        &self.matrix
    }

    /// Items of `source` already consumed
    pub fn cursor(&self, source: RecordSource) -> usize {
        self.cursors.get(&source).copied().unwrap_or(0)
    }

    pub fn failed(&self) -> &BTreeMap<String, FailedItem> {
        &self.failed
    }

    /// True when there are changes not yet written to the exports
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    fn advance_cursor(&mut self, source: RecordSource, to: usize) {
        let current = self.cursor(source);
        if to > current {
            self.cursors.insert(source, to);
            self.dirty = true;
        }
    }

    /// Write every export; the progress file goes last
    fn persist(&self, embedding_model: &str) -> Result<()> {
        self.store.persist()?;
        write_json_atomic(&self.export_dir.join(SEARCH_MATRIX_FILE), &self.matrix)?;

        let view = ConsolidatedView::build(self.store.records(), &self.matrix, embedding_model);
        write_json_atomic(&self.export_dir.join(CONSOLIDATED_FILE), &view)?;

        let progress = PersistedProgress {
            cursors: self.cursors.clone(),
            failed: self.failed.clone(),
        };
        write_json_atomic(&self.export_dir.join(INDEX_STATE_FILE), &progress)?;
        Ok(())
    }
}

/// What one call to [`IncrementalIndexer::run_cycle`] did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub embedded: usize,
    pub retried: usize,
    pub failed: usize,
    /// Sources whose log could not be read or parsed
    pub unreadable_sources: usize,
    pub rebuilt: bool,
    pub total_records: usize,
    pub total_edges: usize,
}

enum Outcome {
    Embedded,
    AlreadyStored,
    Failed,
}

/// Embeds new source items into an [`IndexState`]
pub struct IncrementalIndexer {
    provider: Arc<dyn EmbeddingProvider>,
    sources: Vec<Box<dyn SourceLog>>,
    config: IndexerConfig,
}

impl IncrementalIndexer {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: IndexerConfig) -> Self {
        Self {
            provider,
            sources: Vec::new(),
            config,
        }
    }

    /// Watch another source log
    pub fn with_source(mut self, source: impl SourceLog + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// One full cycle: retries, then every source, then rebuild if dirty
    pub async fn run_cycle(
        &self,
        state: &mut IndexState,
        cancel: &CancellationToken,
    ) -> Result<CycleReport> {
        let mut report = CycleReport::default();

        // items that failed in earlier cycles go first
        report.retried = self.retry_failed(state, cancel).await?;

        for source in &self.sources {
            if cancel.is_cancelled() {
                break;
            }
            // an unreadable log only skips itself; the other sources still run
            match self.process_new_items(state, source.as_ref(), cancel).await {
                Ok(embedded) => report.embedded += embedded,
                Err(e) => {
                    log::warn!("Skipping {} source this cycle: {}", source.source(), e);
                    report.unreadable_sources += 1;
                }
            }
        }

        if state.dirty {
            self.rebuild_exports(state).await?;
            report.rebuilt = true;
        }

        report.failed = state.failed.len();
        report.total_records = state.store.len();
        report.total_edges = state.matrix.edge_count();
        Ok(report)
    }

    /// Embed items appended to `source` since its cursor
    ///
    /// Returns the number of records added. The cursor moves to the log's
    /// length once every new item has been attempted; a cancelled pass
    /// leaves it where it was.
    pub async fn process_new_items(
        &self,
        state: &mut IndexState,
        source: &dyn SourceLog,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let tag = source.source();
        let items = source.read_all()?;
        let cursor = state.cursor(tag);

        if items.len() < cursor {
            log::warn!(
                "Source {} shrank from {} to {} items; keeping cursor",
                tag,
                cursor,
                items.len()
            );
            return Ok(0);
        }
        if items.len() == cursor {
            return Ok(0);
        }

        log::info!("Processing {} new {} items", items.len() - cursor, tag);
        let mut embedded = 0;

        for item in &items[cursor..] {
            if cancel.is_cancelled() {
                log::info!("Cancelled while indexing {}; cursor stays at {}", tag, cursor);
                return Ok(embedded);
            }
            if state.store.has(&item.id) || state.failed.contains_key(&item.id) {
                continue;
            }

            match self.attempt(state, item, cancel).await {
                Outcome::Embedded => embedded += 1,
                Outcome::AlreadyStored => {}
                Outcome::Failed => self.record_failure(state, item.clone(), 1),
            }
        }

        state.advance_cursor(tag, items.len());
        if embedded > 0 {
            log::info!("Embedded {} new {} items", embedded, tag);
        }
        Ok(embedded)
    }

    /// Re-attempt items in the failed side-set
    pub async fn retry_failed(
        &self,
        state: &mut IndexState,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let pending: Vec<FailedItem> = state.failed.values().cloned().collect();
        let mut recovered = 0;

        for failed in pending {
            if cancel.is_cancelled() {
                break;
            }
            let id = failed.item.id.clone();
            state.failed.remove(&id);
            state.dirty = true;

            if state.store.has(&id) {
                continue;
            }
            match self.attempt(state, &failed.item, cancel).await {
                Outcome::Embedded => {
                    log::info!("Recovered {} after {} failed attempts", id, failed.attempts);
                    recovered += 1;
                }
                Outcome::AlreadyStored => {}
                Outcome::Failed => self.record_failure(state, failed.item, failed.attempts + 1),
            }
        }
        Ok(recovered)
    }

    /// Rebuild the matrix off the async runtime and persist every export
    ///
    /// On failure the state stays dirty so the next cycle tries again.
    pub async fn rebuild_exports(&self, state: &mut IndexState) -> Result<()> {
        let snapshot = state.store.snapshot();
        let builder = SimilarityMatrixBuilder::new(self.config.threshold)
            .with_model(self.provider.model_name());

        let matrix = tokio::task::spawn_blocking(move || builder.build(&snapshot))
            .await
            .map_err(|e| MemoryError::Task(e.to_string()))?;
        state.matrix = matrix;

        state.persist(self.provider.model_name())?;
        state.dirty = false;
        log::info!(
            "Persisted exports: {} records, {} edges",
            state.store.len(),
            state.matrix.edge_count()
        );
        Ok(())
    }

    /// Persist if anything is pending
    pub async fn flush(&self, state: &mut IndexState) -> Result<()> {
        if state.dirty {
            self.rebuild_exports(state).await?;
        }
        Ok(())
    }

    async fn attempt(
        &self,
        state: &mut IndexState,
        item: &SourceItem,
        cancel: &CancellationToken,
    ) -> Outcome {
        let text = truncate_for_embedding(&item.text, self.config.max_text_chars);
        let result = self.provider.embed(&text).await;
        self.pause(cancel).await;

        let vector = match result {
            Ok(vector) => vector,
            Err(e) => {
                log::warn!("Failed to embed {}: {}", item.id, e);
                return Outcome::Failed;
            }
        };

        if let Some(expected) = state.store.dimensions() {
            if vector.len() != expected {
                log::warn!(
                    "Embedding for {} has {} dimensions, store uses {}",
                    item.id,
                    vector.len(),
                    expected
                );
                return Outcome::Failed;
            }
        }

        let record = VectorRecord::from_item(item, vector, self.config.preview_chars);
        match state.store.insert(record) {
            Ok(()) => {
                state.dirty = true;
                Outcome::Embedded
            }
            Err(e) if e.is_duplicate() => Outcome::AlreadyStored,
            Err(e) => {
                log::warn!("Failed to store {}: {}", item.id, e);
                Outcome::Failed
            }
        }
    }

    fn record_failure(&self, state: &mut IndexState, item: SourceItem, attempts: u32) {
        state.dirty = true;
        if attempts >= self.config.max_embed_attempts {
            log::warn!(
                "Giving up on {} after {} attempt(s)",
                item.id,
                attempts
            );
            return;
        }
        state
            .failed
            .insert(item.id.clone(), FailedItem { item, attempts });
    }

    async fn pause(&self, cancel: &CancellationToken) {
        if self.config.request_delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.request_delay) => {}
        }
    }
}
