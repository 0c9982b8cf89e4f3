//! Vendor version ordering
//!
//! Two syntaxes are understood:
//! - train: `major.minor(maint[letter])TRAIN[subrelease]`, e.g. `15.2(7)E3`
//! - dotted: `major.minor.patch[letter]`, e.g. `17.12.4a`
//!
//! Anything else parses as all zeros and sorts last.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

use super::static_regex;

static TRAIN_RE: OnceLock<Option<Regex>> = OnceLock::new();
static DOTTED_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// Components of a parsed version, compared field by field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedVersion {
    pub major: u32,
    pub minor: u32,
    pub maintenance: u32,
    pub letter: String,
    pub train: String,
    pub subrelease: u32,
}

fn number(caps: &regex::Captures<'_>, group: usize) -> u32 {
    caps.get(group)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn text(caps: &regex::Captures<'_>, group: usize) -> String {
    caps.get(group)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

impl ParsedVersion {
    pub fn parse(version: &str) -> Self {
        let train = static_regex(&TRAIN_RE, r"(\d+)\.(\d+)\((\d+)([a-zA-Z]?)\)([A-Za-z]*)(\d*)");
        if let Some(caps) = train.and_then(|re| re.captures(version)) {
            return Self {
                major: number(&caps, 1),
                minor: number(&caps, 2),
                maintenance: number(&caps, 3),
                letter: text(&caps, 4).to_lowercase(),
                train: text(&caps, 5).to_uppercase(),
                subrelease: number(&caps, 6),
            };
        }

        let dotted = static_regex(&DOTTED_RE, r"(\d+)\.(\d+)\.(\d+)([a-zA-Z]?)");
        if let Some(caps) = dotted.and_then(|re| re.captures(version)) {
            return Self {
                major: number(&caps, 1),
                minor: number(&caps, 2),
                maintenance: number(&caps, 3),
                letter: text(&caps, 4).to_lowercase(),
                ..Default::default()
            };
        }

        Self::default()
    }
}

/// Newest-first ordering: `Less` means `a` is newer than `b`
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = ParsedVersion::parse(a);
    let b = ParsedVersion::parse(b);
    b.major
        .cmp(&a.major)
        .then_with(|| b.minor.cmp(&a.minor))
        .then_with(|| b.maintenance.cmp(&a.maintenance))
        .then_with(|| b.letter.cmp(&a.letter))
        .then_with(|| b.train.cmp(&a.train))
        .then_with(|| b.subrelease.cmp(&a.subrelease))
}

/// Sort newest first
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| compare_versions(a, b));
}

/// The newest version in `versions`
pub fn highest_version<I, S>(versions: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    versions
        .into_iter()
        .min_by(|a, b| compare_versions(a.as_ref(), b.as_ref()))
        .map(|v| v.as_ref().to_string())
}
