//! Error types for hextrackr-memory

use thiserror::Error;

/// Errors that can occur in the memory system
#[derive(Debug, Error)]
pub enum MemoryError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error talking to a model endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A record with this id is already stored
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// Embedding generation error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Summarizer error
    #[error("Summarizer error: {0}")]
    Summarizer(String),

    /// A summary referenced a raw record that does not exist
    #[error("Unknown source record: {0}")]
    UnknownSourceRecord(String),

    /// Blocking task failed to complete
    #[error("Task error: {0}")]
    Task(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl MemoryError {
    /// Create an embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a summarizer error
    pub fn summarizer(msg: impl Into<String>) -> Self {
        Self::Summarizer(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for the recoverable "already processed" condition
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateId(_))
    }
}

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_id_display() {
        let err = MemoryError::DuplicateId("e1".to_string());
        assert_eq!(err.to_string(), "Duplicate id: e1");
        assert!(err.is_duplicate());
    }

    #[test]
    fn test_helpers() {
        assert_eq!(
            MemoryError::embedding("empty vector").to_string(),
            "Embedding error: empty vector"
        );
        assert!(!MemoryError::other("x").is_duplicate());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: MemoryError = io_err.into();
        assert!(matches!(err, MemoryError::Io(_)));
    }
}
