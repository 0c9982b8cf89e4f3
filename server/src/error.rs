//! Error types for the rMemory daemon.

use hextrackr_memory::MemoryError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the daemon and CLI.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Advisory client error: {0}")]
    Advisory(#[from] crate::advisory::AdvisoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result type alias for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
