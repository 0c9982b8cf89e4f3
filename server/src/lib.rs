//! HexTrackr rMemory Service Library
//!
//! Configuration, the long-running indexing daemon, and the vendor advisory
//! version cache used by HexTrackr's remediation views.

pub mod advisory;
pub mod config;
pub mod daemon;
pub mod error;

pub use advisory::{AdvisoryVersionCache, HexTrackrAdvisoryClient, OsFamily};
pub use config::{load_config, Config};
pub use daemon::{build_indexer, IndexDaemon};
pub use error::{DaemonError, DaemonResult};
