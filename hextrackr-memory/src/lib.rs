//! HexTrackr Memory Core
//!
//! Embedding-backed similarity index and multi-tier memory consolidation
//! for the HexTrackr rMemory system.
//!
//! ## Features
//!
//! - **Incremental indexing** - Resumable per-source cursors over append-only logs
//! - **Similarity matrix** - All-pairs cosine similarity above a threshold, plus topic clusters
//! - **Consolidated export** - Per-source summary, topic tree and flat search index
//! - **Tiered summaries** - Raw records → batch summaries → project summaries, with provenance
//!
//! ## Example
//!
//! ```ignore
//! use hextrackr_memory::{EvidenceLog, IncrementalIndexer, IndexState, IndexerConfig};
//!
//! let provider = Arc::new(OllamaEmbedder::new(OllamaEmbedderConfig::default())?);
//! let indexer = IncrementalIndexer::new(provider, IndexerConfig::default())
//!     .with_source(EvidenceLog::new(".rMemory/json/chat-evidence.json"));
//!
//! let mut state = IndexState::open(".rMemory/search-matrix", 0.3)?;
//! let report = indexer.run_cycle(&mut state, &CancellationToken::new()).await?;
//! ```

pub mod embedding;
pub mod error;
pub mod export;
pub mod indexer;
pub mod persist;
pub mod record;
pub mod similarity;
pub mod source;
pub mod storage;
pub mod summary;

// Re-exports for convenience
pub use embedding::{EmbeddingProvider, OllamaEmbedder, OllamaEmbedderConfig};
pub use error::{MemoryError, Result};
pub use export::ConsolidatedView;
pub use indexer::{CycleReport, IncrementalIndexer, IndexState, IndexerConfig};
pub use record::{RecordSource, SourceItem, VectorRecord};
pub use similarity::{
    cosine_similarity, SimilarityEdge, SimilarityMatrix, SimilarityMatrixBuilder, TopicCluster,
};
pub use source::{CanonicalNotesLog, EvidenceLog, SourceLog};
pub use storage::VectorStore;
pub use summary::{
    PipelineConfig, ProjectSummaryPolicy, SelectionPolicy, Summarizer, TieredSummaryPipeline,
};
