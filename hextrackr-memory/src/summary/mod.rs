//! Multi-tier memory consolidation
//!
//! High-value raw records are batched and summarized by a language model;
//! batch summaries keep links back to their source records and are rolled
//! up into per-project summaries.

mod pipeline;
mod record;
mod store;
mod summarizer;

pub use pipeline::{
    batch, select_high_value, MemoryReport, PipelineConfig, PipelineReport, ProjectSummaryPolicy,
    SelectionPolicy, TieredSummaryPipeline,
};
pub use record::{
    ImportanceRange, ProjectSummaryRecord, ProvenanceLink, RawRecord, SummaryRecord, TimeRange,
};
pub use store::{
    JsonRawRecordStore, JsonSummaryStore, MemoryRawRecordStore, MemorySummaryStore,
    RawRecordStore, SummaryStore,
};
pub use summarizer::{OllamaSummarizer, OllamaSummarizerConfig, Summarizer};
