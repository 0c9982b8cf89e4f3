//! Release train extraction and family matching

use regex::Regex;
use std::sync::OnceLock;

use super::static_regex;
use super::version::sort_versions;

static PAREN_TRAIN_RE: OnceLock<Option<Regex>> = OnceLock::new();
static DOTTED_TRAIN_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// Train letter code of a version, upper-cased
///
/// `15.2(8)E8` → `E`, `12.2(55)SE12` → `SE`, `15.9.3M7` → `M`.
pub fn extract_train(version: &str) -> Option<String> {
    let paren = static_regex(&PAREN_TRAIN_RE, r"\d+\.\d+\([^)]+\)([A-Za-z]+)");
    if let Some(caps) = paren.and_then(|re| re.captures(version)) {
        return caps.get(1).map(|m| m.as_str().to_uppercase());
    }

    let dotted = static_regex(&DOTTED_TRAIN_RE, r"\d+\.\d+\.\d+([A-Z]+)\d*");
    dotted
        .and_then(|re| re.captures(version))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Fold train variants into their canonical family
pub fn normalize_train_family(code: &str) -> String {
    let code = code.to_uppercase();
    if ["SE", "SG", "EA", "ED"].iter().any(|p| code.starts_with(p)) {
        "E".to_string()
    } else if code.starts_with('M') {
        "M".to_string()
    } else if code.starts_with('S') {
        "S".to_string()
    } else {
        code
    }
}

/// Normalized train family of a version, if it has a train
pub fn train_family(version: &str) -> Option<String> {
    extract_train(version).map(|code| normalize_train_family(&code))
}

/// Pick the best fixed version for an installed version
///
/// `candidates` must already be sorted newest first. Returns the newest
/// candidate sharing the installed train family, else the newest overall.
pub fn select_fixed_version(installed: Option<&str>, candidates: &[String]) -> Option<String> {
    let top = candidates.first()?;

    let Some(family) = installed.and_then(train_family) else {
        return Some(top.clone());
    };

    match candidates
        .iter()
        .find(|v| train_family(v).as_deref() == Some(family.as_str()))
    {
        Some(matched) => Some(matched.clone()),
        None => {
            tracing::info!(
                "No {} train fix among {:?}; falling back to {}",
                family,
                candidates,
                top
            );
            Some(top.clone())
        }
    }
}

/// Sort then select; convenience for unsorted inputs
pub fn best_fixed_version(installed: Option<&str>, mut candidates: Vec<String>) -> Option<String> {
    sort_versions(&mut candidates);
    select_fixed_version(installed, &candidates)
}
