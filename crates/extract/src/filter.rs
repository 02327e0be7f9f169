use std::collections::HashSet;

use anyhow::{Context, Result};
use regex::Regex;

const MIN_NAME_LEN: usize = 3;

/// Exact (case-insensitive) names that are never entities.
const BLACKLIST: &[&str] = &[
    "united states",
    "the united states",
    "page intentionally left blank",
    "privileged and confidential",
    "attorney client",
    "attorney client privilege",
    "document produced",
    "original message",
    "forwarded message",
    "sent from my iphone",
    "thank you",
    "best regards",
    "kind regards",
    "good morning",
    "good afternoon",
    "happy birthday",
    "dear sir",
    "to whom it may concern",
];

/// Whole-name patterns: Bates stamps, exhibit labels, docket numbers.
const BLACKLIST_PATTERNS: &[&str] = &[
    r"(?i)^efta\s*\d+$",
    r"(?i)^exhibit\s+[a-z0-9]+$",
    r"(?i)^case\s+no\b",
    r"(?i)^page\s+\d+",
    r"(?i)^(mon|tues|wednes|thurs|fri|satur|sun)day\b",
    r"^[A-Z]{1,2}( [A-Z]{1,2})+$",
];

/// Substrings that mark a candidate as document furniture.
const PARTIAL_BLOCKLIST: &[&str] = &[
    "confidential",
    "redacted",
    "subject to protective order",
    "bates",
    "declassified",
    "unclassified",
    "produced pursuant",
    "deposition of",
    "http",
    "www",
    "@",
];

const HONORIFICS: &[&str] = &["mr", "mrs", "ms", "miss", "dr", "mister"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    Blacklisted,
    BlacklistPattern(String),
    PartialBlocklist(String),
    BareSurname,
    Boilerplate,
}

/// Rejects noise candidates before they reach the resolver.
pub struct JunkFilter {
    blacklist: HashSet<String>,
    blacklist_patterns: Vec<Regex>,
    partial_blocklist: Vec<String>,
}

impl JunkFilter {
    pub fn new() -> Result<Self> {
        Self::with_lists(BLACKLIST, BLACKLIST_PATTERNS, PARTIAL_BLOCKLIST)
    }

    pub fn with_lists(blacklist: &[&str], patterns: &[&str], partial: &[&str]) -> Result<Self> {
        let blacklist_patterns = patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("Invalid blacklist pattern: {}", p)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            blacklist: blacklist.iter().map(|s| s.to_lowercase()).collect(),
            blacklist_patterns,
            partial_blocklist: partial.iter().map(|s| s.to_lowercase()).collect(),
        })
    }

    /// Check a normalized candidate. `None` means keep it.
    pub fn check(&self, normalized: &str) -> Option<RejectReason> {
        if normalized.chars().count() < MIN_NAME_LEN {
            return Some(RejectReason::TooShort);
        }

        let key = normalized.to_lowercase();
        if self.blacklist.contains(&key) {
            return Some(RejectReason::Blacklisted);
        }

        if let Some(pattern) = self.blacklist_patterns.iter().find(|p| p.is_match(normalized)) {
            return Some(RejectReason::BlacklistPattern(pattern.as_str().to_string()));
        }

        if let Some(term) = self.partial_blocklist.iter().find(|term| key.contains(term.as_str())) {
            return Some(RejectReason::PartialBlocklist(term.clone()));
        }

        if is_bare_epstein(&key) {
            return Some(RejectReason::BareSurname);
        }

        None
    }

    /// Full gate: name checks plus the boilerplate classification of the
    /// surrounding text.
    pub fn check_in_context(
        &self,
        normalized: &str,
        surrounding: &str,
        boilerplate: &dyn BoilerplateClassifier,
    ) -> Option<RejectReason> {
        self.check(normalized).or_else(|| {
            boilerplate
                .is_boilerplate(surrounding)
                .then_some(RejectReason::Boilerplate)
        })
    }
}

/// "Epstein" on its own (or behind an honorific) is ambiguous between the
/// person, the estate and the island; only "Epstein Island" survives.
fn is_bare_epstein(key: &str) -> bool {
    let tokens: Vec<&str> = key
        .split_whitespace()
        .map(|t| t.trim_end_matches('.'))
        .filter(|t| !HONORIFICS.contains(t))
        .collect();

    tokens == ["epstein"] && !key.contains("island")
}

/// External collaborator deciding whether text is page furniture
/// (headers, footers, stamps) rather than content.
pub trait BoilerplateClassifier: Send + Sync {
    fn is_boilerplate(&self, text: &str) -> bool;
}

/// Default keyword classifier for common legal-production furniture.
pub struct KeywordBoilerplate {
    patterns: Vec<Regex>,
}

impl KeywordBoilerplate {
    pub fn new() -> Result<Self> {
        let patterns = [
            r"(?i)\bpage\s+\d+\s+of\s+\d+\b",
            r"(?i)\bcase\s+\d+:\d+-\w+-\d+",
            r"(?i)\bfiled\s+\d{1,2}/\d{1,2}/\d{2,4}\b",
            r"(?i)\bdocument\s+\d+-?\d*\s+filed\b",
            r"(?i)\bEFTA\d{5,}\b",
        ]
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("Invalid boilerplate pattern: {}", p)))
        .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }
}

impl BoilerplateClassifier for KeywordBoilerplate {
    fn is_boilerplate(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}
