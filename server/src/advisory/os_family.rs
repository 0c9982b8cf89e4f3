//! Operating system family classification
//!
//! An ordered rule list: the first matching rule decides. Explicit names
//! win over numeric heuristics.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Vendor OS family, used to scope advisory lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    IosXe,
    IosXr,
    NxOs,
    Ios,
    Unknown,
}

impl OsFamily {
    /// Tag sent to the advisory endpoint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IosXe => "iosxe",
            Self::IosXr => "iosxr",
            Self::NxOs => "nxos",
            Self::Ios => "ios",
            Self::Unknown => "unknown",
        }
    }

    /// Classify a free-form version string; never fails
    pub fn classify(version: &str) -> Self {
        let upper = version.to_uppercase();
        rules()
            .iter()
            .find(|rule| rule.matcher.matches(version, &upper))
            .map(|rule| rule.family)
            .unwrap_or(Self::Unknown)
    }

    /// `None` for `Unknown`
    pub fn known(self) -> Option<Self> {
        (self != Self::Unknown).then_some(self)
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

enum Matcher {
    /// Any of these substrings in the upper-cased input
    Names(&'static [&'static str]),
    Pattern(Regex),
}

impl Matcher {
    fn matches(&self, original: &str, upper: &str) -> bool {
        match self {
            Self::Names(names) => names.iter().any(|n| upper.contains(n)),
            Self::Pattern(re) => re.is_match(original),
        }
    }
}

struct Rule {
    matcher: Matcher,
    family: OsFamily,
}

const PATTERN_RULES: &[(&str, OsFamily)] = &[
    // train notation: 15.2(8)E8
    (r"\d+\.\d+\([^)]+\)[a-zA-Z]*\d*", OsFamily::Ios),
    // dotted with an upper-case train: 15.9.3M7
    (r"\d+\.\d+\.\d+[A-Z]+\d*", OsFamily::Ios),
    (r"\b(16|17|3)\.\d+\.\d+$", OsFamily::IosXe),
    (r"\b(16|17|3)\.\d+\.\d+[a-z]$", OsFamily::IosXe),
    (r"\b[67]\.\d+\.\d+", OsFamily::IosXr),
    // unreachable in practice: the train rule above already claims 9.x(y)
    (r"\b9\.\d+\(\d+\)", OsFamily::NxOs),
];

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let mut rules = vec![
            Rule {
                matcher: Matcher::Names(&["IOS XE", "IOS-XE", "IOSXE"]),
                family: OsFamily::IosXe,
            },
            Rule {
                matcher: Matcher::Names(&["IOS XR", "IOS-XR", "IOSXR"]),
                family: OsFamily::IosXr,
            },
            Rule {
                matcher: Matcher::Names(&["NX-OS", "NXOS"]),
                family: OsFamily::NxOs,
            },
        ];
        for (pattern, family) in PATTERN_RULES {
            if let Ok(re) = Regex::new(pattern) {
                rules.push(Rule {
                    matcher: Matcher::Pattern(re),
                    family: *family,
                });
            }
        }
        rules
    })
}
