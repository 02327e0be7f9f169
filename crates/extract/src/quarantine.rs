use anyhow::{Context, Result};
use regex::Regex;

/// Ordered (reason, pattern) pairs; the first match decides the reason.
const SENSITIVE_PATTERNS: &[(&str, &str)] = &[
    ("csam_reference", r"(?i)\b(csam|child sexual abuse material|child pornography)\b"),
    ("minor_victim_identity", r"(?i)\b(minor victim|victim[- ]\d+)\b.{0,80}\b(date of birth|dob|home address)\b"),
    ("social_security_number", r"\b\d{3}-\d{2}-\d{4}\b"),
    ("sealed_juvenile_record", r"(?i)\bsealed\b.{0,40}\bjuvenile\b"),
    ("medical_record", r"(?i)\b(medical record number|mrn:)"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineVerdict {
    pub reason: String,
}

struct QuarantineRule {
    reason: String,
    pattern: Regex,
}

/// Whole-document gate run before any extraction.
pub struct Quarantine {
    rules: Vec<QuarantineRule>,
}

impl Quarantine {
    pub fn new() -> Result<Self> {
        Self::with_patterns(SENSITIVE_PATTERNS)
    }

    pub fn with_patterns(patterns: &[(&str, &str)]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(|(reason, pattern)| {
                let pattern = Regex::new(pattern)
                    .with_context(|| format!("Invalid quarantine pattern for {}", reason))?;
                Ok(QuarantineRule {
                    reason: reason.to_string(),
                    pattern,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    pub fn scan(&self, text: &str) -> Option<QuarantineVerdict> {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(text))
            .map(|rule| QuarantineVerdict {
                reason: rule.reason.clone(),
            })
    }
}
