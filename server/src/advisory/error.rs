//! Advisory lookup errors
//!
//! These never reach callers of the cache; they are logged and turned into
//! negative entries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Advisory endpoint returned status {0}")]
    Status(u16),

    #[error("Advisory lookup timed out")]
    Timeout,
}

pub type AdvisoryResult<T> = Result<T, AdvisoryError>;
