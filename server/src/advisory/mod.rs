//! Vendor advisory lookups
//!
//! Resolves the fixed software version for a CVE on a given device:
//! version ordering, OS family classification, release-train matching and
//! a TTL cache with single-flight population in front of the remote API.

mod cache;
mod error;
mod os_family;
mod provider;
mod train;
mod version;

pub use cache::{AdvisoryCacheConfig, AdvisoryVersionCache, CacheKey, CacheStats, Device};
pub use error::{AdvisoryError, AdvisoryResult};
pub use os_family::OsFamily;
pub use provider::{AdvisoryFix, AdvisoryProvider, HexTrackrAdvisoryClient};
pub use train::{best_fixed_version, extract_train, normalize_train_family, select_fixed_version};
pub use version::{compare_versions, highest_version, sort_versions, ParsedVersion};

use regex::Regex;
use std::sync::OnceLock;

/// Compile `pattern` once into `cell`; `None` if it does not compile
fn static_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}
