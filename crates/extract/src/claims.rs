use anyhow::{Context, Result};
use regex::Regex;

use crate::rules::{Rule, RuleSet};
use crate::schema::Modality;

pub const BASE_CLAIM_CONFIDENCE: f64 = 0.7;

/// Ordered predicate table. Every firing row yields one claim.
const PREDICATES: &[(&str, &str)] = &[
    (
        "contacted",
        r"(?i)\b(met|meet|meets|meeting|called|calls|phoned|emailed|e-mailed|texted|wrote to|spoke (with|to)|talked (with|to)|dined with|visited with|contacted)\b",
    ),
    (
        "traveled_to",
        r"(?i)\b(flew|flown|flight|flights|traveled|travelled|visited|trip to|stayed at|arrived (at|in)|landed (at|in))\b",
    ),
    (
        "financial_link",
        r"(?i)(\b(paid|pays|wired|transferred|donated|funded|loaned|invested|deposited|payment|payments|compensated)\b|\$\s?\d)",
    ),
    (
        "affiliated",
        r"(?i)\b(worked (for|with|at)|employed by|employee of|hired|partner of|member of|associate of|assistant to|director of|represented)\b",
    ),
    (
        "legal_action",
        r"(?i)\b(sued|suing|charged|indicted|arrested|subpoenaed|deposed|prosecuted|convicted|testified against|filed suit)\b",
    ),
    (
        "recruited",
        r"(?i)\b(recruited|recruiting|trafficked|trafficking|groomed|procured|lured)\b",
    ),
];

const NEGATION: &str =
    r"(?i)\b(not|never|no|denied|denies|deny|denying|false|falsely|didn't|did not|wasn't|was not|neither|nor)\b";

pub struct PredicateRule {
    predicate: String,
    pattern: Regex,
}

impl PredicateRule {
    pub fn new(predicate: &str, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .with_context(|| format!("Invalid predicate pattern for {}", predicate))?;

        Ok(Self {
            predicate: predicate.to_string(),
            pattern,
        })
    }
}

impl Rule for PredicateRule {
    type Output = String;

    fn name(&self) -> &str {
        &self.predicate
    }

    fn apply(&self, text: &str, _context: &str) -> Option<String> {
        self.pattern.is_match(text).then(|| self.predicate.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedClaim {
    pub predicate: String,
    pub modality: Modality,
}

pub struct ClaimPatterns {
    predicates: RuleSet<PredicateRule>,
    negation: Regex,
}

impl ClaimPatterns {
    pub fn new() -> Result<Self> {
        let predicates = PREDICATES
            .iter()
            .map(|(predicate, pattern)| PredicateRule::new(predicate, pattern))
            .collect::<Result<Vec<_>>>()?;
        let negation = Regex::new(NEGATION).context("Failed to compile negation pattern")?;

        Ok(Self {
            predicates: RuleSet::new(predicates),
            negation,
        })
    }

    /// Predicates found in the text between two mentions, in table order.
    /// Modality is per text, not per predicate.
    pub fn detect(&self, text: &str) -> Vec<DetectedClaim> {
        let found = self.predicates.all_matches(text, "");
        if found.is_empty() {
            return Vec::new();
        }

        let modality = if self.negation.is_match(text) {
            Modality::Denied
        } else {
            Modality::Asserted
        };

        found
            .into_iter()
            .map(|predicate| DetectedClaim { predicate, modality })
            .collect()
    }
}

/// Confidence of a (subject, predicate, object) seen in `distinct_documents`
/// documents.
pub fn corroborated_confidence(distinct_documents: usize) -> f64 {
    if distinct_documents <= 1 {
        return BASE_CLAIM_CONFIDENCE;
    }
    let boost = ((distinct_documents as f64).log2() * 0.1).min(0.3);
    (BASE_CLAIM_CONFIDENCE + boost).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_is_asserted() {
        let patterns = ClaimPatterns::new().unwrap();
        let found = patterns.detect("Donald Trump met with Jeffrey Epstein");

        assert_eq!(
            found,
            vec![DetectedClaim {
                predicate: "contacted".into(),
                modality: Modality::Asserted,
            }]
        );
    }

    #[test]
    fn test_several_predicates_fire() {
        let patterns = ClaimPatterns::new().unwrap();
        let found: Vec<String> = patterns
            .detect("Sarah Kellen flew to the island and was paid $5,000 by Ghislaine Maxwell")
            .into_iter()
            .map(|c| c.predicate)
            .collect();

        assert_eq!(found, vec!["traveled_to", "financial_link"]);
    }

    #[test]
    fn test_negation_marks_denied() {
        let patterns = ClaimPatterns::new().unwrap();
        let found = patterns.detect("Bill Clinton never flew with Jeffrey Epstein");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].modality, Modality::Denied);
        assert!(patterns.detect("Leslie Wexner and Jeffrey Epstein").is_empty());
    }

    #[test]
    fn test_corroboration_curve() {
        assert_eq!(corroborated_confidence(1), 0.7);
        assert!((corroborated_confidence(2) - 0.8).abs() < 1e-9);
        assert!((corroborated_confidence(3) - 0.858_496).abs() < 1e-5);
        assert!((corroborated_confidence(4) - 0.9).abs() < 1e-9);
        assert!((corroborated_confidence(16) - 1.0).abs() < 1e-9);
        assert!(corroborated_confidence(500) <= 1.0);

        let curve: Vec<f64> = (1..40).map(corroborated_confidence).collect();
        assert!(curve.windows(2).all(|w| w[0] <= w[1]));
    }
}
