//! TTL + LRU cache in front of the advisory provider.

use dashmap::DashMap;
use futures_util::future::join_all;
use lru::LruCache;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use super::error::AdvisoryError;
use super::os_family::OsFamily;
use super::provider::AdvisoryProvider;
use super::static_regex;
use super::train::select_fixed_version;
use super::version::{highest_version, sort_versions};

static CVE_RE: OnceLock<Option<Regex>> = OnceLock::new();

const DEFAULT_CAPACITY: usize = 1000;

/// Cache tuning.
#[derive(Debug, Clone)]
pub struct AdvisoryCacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
    /// Upper bound on one provider call.
    pub lookup_timeout: Duration,
    /// Case-insensitive substrings a vendor name must contain.
    pub vendor_markers: Vec<String>,
}

impl Default for AdvisoryCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            capacity: DEFAULT_CAPACITY,
            lookup_timeout: Duration::from_secs(15),
            vendor_markers: vec!["cisco".to_string()],
        }
    }
}

/// Cache key: CVE, scoped by OS family when one was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub cve_id: String,
    pub os_family: Option<OsFamily>,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.os_family {
            Some(family) => write!(f, "{}:{}", self.cve_id, family),
            None => f.write_str(&self.cve_id),
        }
    }
}

/// Cached fixed versions, newest first. Empty means negative.
#[derive(Clone)]
struct CacheEntry {
    versions: Vec<String>,
    fetched_at: Instant,
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub keys: Vec<String>,
    pub negative_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub provider_calls: u64,
}

/// A device and the CVEs reported against it.
#[derive(Debug, Clone, Default)]
pub struct Device {
    pub vendor: String,
    pub operating_system: Option<String>,
    pub cve_ids: Vec<String>,
}

/// Resolves the best fixed version for a CVE, caching provider answers.
///
/// Lookups never fail: every error path yields `None` and a negative
/// entry that lives for one TTL.
pub struct AdvisoryVersionCache {
    provider: Arc<dyn AdvisoryProvider>,
    config: AdvisoryCacheConfig,
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    /// One gate per key being fetched.
    inflight: DashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    provider_calls: AtomicU64,
}

impl AdvisoryVersionCache {
    pub fn new(provider: Arc<dyn AdvisoryProvider>, config: AdvisoryCacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity)
            .unwrap_or(NonZeroUsize::MIN.saturating_add(DEFAULT_CAPACITY - 1));

        Self {
            provider,
            config,
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            provider_calls: AtomicU64::new(0),
        }
    }

    /// Best fixed version for `cve_id` on a device from `vendor`.
    pub async fn get_fixed_version(
        &self,
        cve_id: &str,
        vendor: &str,
        installed_version: Option<&str>,
    ) -> Option<String> {
        if !self.is_supported_vendor(vendor) {
            return None;
        }

        let cve_id = cve_id.trim();
        if !is_valid_cve(cve_id) {
            tracing::warn!("Invalid CVE ID: {:?}", cve_id);
            return None;
        }

        let key = CacheKey {
            cve_id: cve_id.to_string(),
            os_family: installed_version
                .map(OsFamily::classify)
                .and_then(OsFamily::known),
        };
        let versions = self.versions_for(key).await;
        select_fixed_version(installed_version, &versions)
    }

    /// Highest fixed version across every CVE on a device.
    pub async fn get_device_fixed_version(&self, device: &Device) -> Option<String> {
        let mut seen = HashSet::new();
        let cves: Vec<&str> = device
            .cve_ids
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty() && seen.insert(*c))
            .collect();
        if cves.is_empty() {
            return None;
        }

        let os = device.operating_system.as_deref();
        let results = join_all(
            cves.iter()
                .map(|cve| self.get_fixed_version(cve, &device.vendor, os)),
        )
        .await;

        let mut unique = HashSet::new();
        let fixed: Vec<String> = results
            .into_iter()
            .flatten()
            .filter(|v| unique.insert(v.clone()))
            .collect();
        highest_version(&fixed)
    }

    /// Drop every entry.
    pub fn clear_cache(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
        tracing::info!("Advisory cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let (size, capacity, keys, negative_entries): (usize, usize, Vec<String>, usize) =
            match self.entries.lock() {
                Ok(entries) => (
                    entries.len(),
                    entries.cap().get(),
                    entries.iter().map(|(k, _)| k.to_string()).collect(),
                    entries.iter().filter(|(_, e)| e.versions.is_empty()).count(),
                ),
                Err(_) => (0, self.config.capacity, Vec::new(), 0),
            };

        CacheStats {
            size,
            capacity,
            keys,
            negative_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
        }
    }

    fn is_supported_vendor(&self, vendor: &str) -> bool {
        let vendor = vendor.to_lowercase();
        self.config
            .vendor_markers
            .iter()
            .any(|marker| vendor.contains(&marker.to_lowercase()))
    }

    /// Cached versions, fetching at most once per key at a time.
    async fn versions_for(&self, key: CacheKey) -> Vec<String> {
        if let Some(versions) = self.fresh(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return versions;
        }

        let gate = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        // declared before the lock guard so the lock is released first
        let _slot = InflightSlot {
            inflight: &self.inflight,
            key: &key,
            gate: &gate,
        };
        let _guard = gate.lock().await;

        // another caller may have filled it while we waited
        if let Some(versions) = self.fresh(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return versions;
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let versions = self.fetch(&key).await;
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(
                key.clone(),
                CacheEntry {
                    versions: versions.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }
        versions
    }

    fn fresh(&self, key: &CacheKey) -> Option<Vec<String>> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if entry.fetched_at.elapsed() < self.config.ttl {
            Some(entry.versions.clone())
        } else {
            None
        }
    }

    async fn fetch(&self, key: &CacheKey) -> Vec<String> {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);

        let call = self
            .provider
            .fetch_fixed_versions(&key.cve_id, key.os_family);
        let outcome = match tokio::time::timeout(self.config.lookup_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AdvisoryError::Timeout),
        };

        let rows = match outcome {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Advisory lookup for {} failed: {}", key, e);
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let mut versions: Vec<String> = rows
            .into_iter()
            .map(|row| row.fixed_version.trim().to_string())
            .filter(|v| !v.is_empty() && seen.insert(v.clone()))
            .collect();
        sort_versions(&mut versions);

        if versions.is_empty() {
            tracing::debug!("No fixed versions for {}", key);
        }
        versions
    }
}

fn is_valid_cve(cve_id: &str) -> bool {
    static_regex(&CVE_RE, r"^CVE-\d{4}-\d{4,}$").is_some_and(|re| re.is_match(cve_id))
}

/// Removes a key's gate from the in-flight map on every exit, including a
/// dropped future. Only the gate this caller joined is removed.
struct InflightSlot<'a> {
    inflight: &'a DashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>,
    key: &'a CacheKey,
    gate: &'a Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        self.inflight
            .remove_if(self.key, |_, current| Arc::ptr_eq(current, self.gate));
    }
}
