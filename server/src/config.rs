//! Configuration for the rMemory daemon.
//!
//! Loaded from a TOML file. Every field has a default, so a missing section
//! (or running without `--config`) yields the stock HexTrackr layout.
//!
//! ```toml
//! [paths]
//! memory_dir = ".rMemory"
//!
//! [indexer]
//! threshold = 0.3
//! poll_interval_secs = 30
//!
//! [summarizer]
//! project_policy = "replace"
//!
//! [advisory]
//! base_url = "http://localhost:8989"
//! vendor_markers = ["cisco"]
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hextrackr_memory::summary::{
    OllamaSummarizerConfig, PipelineConfig, ProjectSummaryPolicy, SelectionPolicy,
};
use hextrackr_memory::{IndexerConfig, OllamaEmbedderConfig};

use crate::advisory::AdvisoryCacheConfig;
use crate::error::{DaemonError, DaemonResult};

/// Upper bound on the summarizer recency window (about a century)
const MAX_RECENCY_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexer: IndexerSection,
    #[serde(default)]
    pub summarizer: SummarizerSection,
    #[serde(default)]
    pub advisory: AdvisorySection,
}

/// File locations. Relative entries resolve against `memory_dir`.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_memory_dir")]
    pub memory_dir: PathBuf,
    #[serde(default = "default_evidence_log")]
    pub evidence_log: PathBuf,
    #[serde(default = "default_canonical_notes")]
    pub canonical_notes: PathBuf,
    #[serde(default = "default_raw_records")]
    pub raw_records: PathBuf,
    #[serde(default = "default_summary_store")]
    pub summary_store: PathBuf,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            memory_dir: default_memory_dir(),
            evidence_log: default_evidence_log(),
            canonical_notes: default_canonical_notes(),
            raw_records: default_raw_records(),
            summary_store: default_summary_store(),
            export_dir: default_export_dir(),
        }
    }
}

impl PathsConfig {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.memory_dir.join(path)
        }
    }

    pub fn evidence_log_path(&self) -> PathBuf {
        self.resolve(&self.evidence_log)
    }

    pub fn canonical_notes_path(&self) -> PathBuf {
        self.resolve(&self.canonical_notes)
    }

    pub fn raw_records_path(&self) -> PathBuf {
        self.resolve(&self.raw_records)
    }

    pub fn summary_store_path(&self) -> PathBuf {
        self.resolve(&self.summary_store)
    }

    pub fn export_dir_path(&self) -> PathBuf {
        self.resolve(&self.export_dir)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout_secs(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

impl EmbeddingConfig {
    pub fn to_embedder_config(&self) -> OllamaEmbedderConfig {
        OllamaEmbedderConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerSection {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
    #[serde(default = "default_max_embed_attempts")]
    pub max_embed_attempts: u32,
    #[serde(default = "default_index_preview_chars")]
    pub preview_chars: usize,
}

impl Default for IndexerSection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            request_delay_ms: default_request_delay_ms(),
            poll_interval_secs: default_poll_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
            max_embed_attempts: default_max_embed_attempts(),
            preview_chars: default_index_preview_chars(),
        }
    }
}

impl IndexerSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerSection {
    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_summarizer_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_summarizer_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_record_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_min_importance")]
    pub min_importance: u32,
    #[serde(default = "default_message_types")]
    pub message_types: Vec<String>,
    #[serde(default = "default_recency_days")]
    pub recency_days: i64,
    #[serde(default)]
    pub project_policy: ProjectSummaryPolicy,
}

impl Default for SummarizerSection {
    fn default() -> Self {
        Self {
            endpoint: default_ollama_endpoint(),
            model: default_summarizer_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_summarizer_timeout_secs(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            preview_chars: default_record_preview_chars(),
            min_importance: default_min_importance(),
            message_types: default_message_types(),
            recency_days: default_recency_days(),
            project_policy: ProjectSummaryPolicy::default(),
        }
    }
}

impl SummarizerSection {
    pub fn to_summarizer_config(&self) -> OllamaSummarizerConfig {
        OllamaSummarizerConfig {
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            preview_chars: self.preview_chars,
            selection: SelectionPolicy {
                min_importance: self.min_importance,
                message_types: self.message_types.clone(),
                recency: chrono::Duration::days(self.recency_days),
            },
            project_policy: self.project_policy,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorySection {
    #[serde(default = "default_advisory_base_url")]
    pub base_url: String,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_advisory_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_vendor_markers")]
    pub vendor_markers: Vec<String>,
}

impl Default for AdvisorySection {
    fn default() -> Self {
        Self {
            base_url: default_advisory_base_url(),
            ttl_secs: default_ttl_secs(),
            capacity: default_capacity(),
            timeout_secs: default_advisory_timeout_secs(),
            vendor_markers: default_vendor_markers(),
        }
    }
}

impl AdvisorySection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn to_cache_config(&self) -> AdvisoryCacheConfig {
        AdvisoryCacheConfig {
            ttl: Duration::from_secs(self.ttl_secs),
            capacity: self.capacity,
            lookup_timeout: self.timeout(),
            vendor_markers: self.vendor_markers.clone(),
        }
    }
}

impl Config {
    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            threshold: self.indexer.threshold,
            request_delay: Duration::from_millis(self.indexer.request_delay_ms),
            max_text_chars: self.embedding.max_text_chars,
            max_embed_attempts: self.indexer.max_embed_attempts,
            preview_chars: self.indexer.preview_chars,
        }
    }

    fn validate(&self) -> DaemonResult<()> {
        if !(-1.0..=1.0).contains(&self.indexer.threshold) {
            return Err(DaemonError::invalid_config(
                "indexer.threshold must be in [-1, 1]",
            ));
        }
        if self.indexer.max_embed_attempts == 0 {
            return Err(DaemonError::invalid_config(
                "indexer.max_embed_attempts must be > 0",
            ));
        }
        if self.embedding.max_text_chars == 0 {
            return Err(DaemonError::invalid_config(
                "embedding.max_text_chars must be > 0",
            ));
        }
        if self.summarizer.batch_size == 0 {
            return Err(DaemonError::invalid_config(
                "summarizer.batch_size must be > 0",
            ));
        }
        if !(0..=MAX_RECENCY_DAYS).contains(&self.summarizer.recency_days) {
            return Err(DaemonError::invalid_config(format!(
                "summarizer.recency_days must be in [0, {}]",
                MAX_RECENCY_DAYS
            )));
        }
        if self.advisory.ttl_secs == 0 {
            return Err(DaemonError::invalid_config("advisory.ttl_secs must be > 0"));
        }
        if self
            .advisory
            .vendor_markers
            .iter()
            .all(|m| m.trim().is_empty())
        {
            return Err(DaemonError::invalid_config(
                "advisory.vendor_markers must contain at least one marker",
            ));
        }
        Ok(())
    }
}

// Defaults

fn default_memory_dir() -> PathBuf {
    PathBuf::from(".rMemory")
}

fn default_evidence_log() -> PathBuf {
    PathBuf::from("json/chat-evidence.json")
}

fn default_canonical_notes() -> PathBuf {
    PathBuf::from("json/canonical-notes.json")
}

fn default_raw_records() -> PathBuf {
    PathBuf::from("json/extended-memory.json")
}

fn default_summary_store() -> PathBuf {
    PathBuf::from("json/summaries.json")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("search-matrix")
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text:latest".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

fn default_max_text_chars() -> usize {
    8000
}

fn default_threshold() -> f64 {
    0.3
}

fn default_request_delay_ms() -> u64 {
    100
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_error_backoff_secs() -> u64 {
    10
}

fn default_max_embed_attempts() -> u32 {
    3
}

fn default_index_preview_chars() -> usize {
    200
}

fn default_summarizer_model() -> String {
    "qwen2.5-coder:7b".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_top_p() -> f32 {
    0.8
}

fn default_max_tokens() -> u32 {
    500
}

fn default_summarizer_timeout_secs() -> u64 {
    120
}

fn default_batch_size() -> usize {
    8
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_record_preview_chars() -> usize {
    300
}

fn default_min_importance() -> u32 {
    2
}

fn default_message_types() -> Vec<String> {
    vec![
        "bug_fix".to_string(),
        "feature_development".to_string(),
        "analysis".to_string(),
    ]
}

fn default_recency_days() -> i64 {
    7
}

fn default_advisory_base_url() -> String {
    "http://localhost:8989".to_string()
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_capacity() -> usize {
    1000
}

fn default_advisory_timeout_secs() -> u64 {
    15
}

fn default_vendor_markers() -> Vec<String> {
    vec!["cisco".to_string()]
}

/// Parse and validate a TOML config string.
pub fn parse_config(content: &str) -> DaemonResult<Config> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path`, or the defaults when `path` is `None`.
pub fn load_config(path: Option<&Path>) -> DaemonResult<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let content = std::fs::read_to_string(path).map_err(|source| DaemonError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}
