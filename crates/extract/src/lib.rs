pub mod blocking;
pub mod claims;
pub mod filter;
pub mod mentions;
pub mod normalizer;
pub mod quarantine;
pub mod resolver;
pub mod rules;
pub mod schema;

pub use blocking::{AliasCache, BlockingIndex, CachedEntity, ScoredCandidate};
pub use claims::{corroborated_confidence, ClaimPatterns, DetectedClaim, BASE_CLAIM_CONFIDENCE};
pub use filter::{BoilerplateClassifier, JunkFilter, KeywordBoilerplate, RejectReason};
pub use mentions::{ContextWindow, Evidence, MentionExtractor, RawCandidate};
pub use normalizer::{name_key, normalize};
pub use quarantine::{Quarantine, QuarantineVerdict};
pub use resolver::{NameResolution, Resolver};
pub use rules::{Rule, RuleSet, VipEntry, VipTable};
pub use schema::*;

use anyhow::Result;

/// A candidate that survived the junk gate, with everything persistence
/// needs later.
#[derive(Debug, Clone)]
pub struct AcceptedCandidate {
    pub raw: RawCandidate,
    pub normalized: String,
    pub window: ContextWindow,
    pub evidence: Evidence,
}

#[derive(Debug, Clone)]
pub struct RejectedCandidate {
    pub raw: RawCandidate,
    pub normalized: String,
    pub reason: RejectReason,
}

#[derive(Debug, Default)]
pub struct SpanCandidates {
    pub accepted: Vec<AcceptedCandidate>,
    pub rejected: Vec<RejectedCandidate>,
}

/// Text-side half of the pipeline: quarantine gate, candidate extraction,
/// normalization and junk filtering. Holds no store state.
pub struct Extractor {
    mentions: MentionExtractor,
    filter: JunkFilter,
    quarantine: Quarantine,
    boilerplate: Box<dyn BoilerplateClassifier>,
}

impl Extractor {
    pub fn new(context_radius: usize) -> Result<Self> {
        Ok(Self {
            mentions: MentionExtractor::new(context_radius)?,
            filter: JunkFilter::new()?,
            quarantine: Quarantine::new()?,
            boilerplate: Box::new(KeywordBoilerplate::new()?),
        })
    }

    pub fn with_boilerplate(mut self, classifier: Box<dyn BoilerplateClassifier>) -> Self {
        self.boilerplate = classifier;
        self
    }

    pub fn quarantine(&self, text: &str) -> Option<QuarantineVerdict> {
        self.quarantine.scan(text)
    }

    /// Candidates of one span. `flagged_boilerplate` is the upstream
    /// sentence flag; when set every candidate is rejected.
    pub fn candidates(&self, text: &str, flagged_boilerplate: bool) -> SpanCandidates {
        let mut out = SpanCandidates::default();

        for raw in self.mentions.extract(text) {
            let normalized = normalize(&raw.surface);
            let window = self.mentions.window(text, raw.start, raw.end);

            let rejection = if flagged_boilerplate {
                self.filter.check(&normalized).or(Some(RejectReason::Boilerplate))
            } else {
                self.filter
                    .check_in_context(&normalized, &window.quote(&raw.surface), self.boilerplate.as_ref())
            };

            match rejection {
                Some(reason) => out.rejected.push(RejectedCandidate {
                    raw,
                    normalized,
                    reason,
                }),
                None => {
                    let evidence = self.mentions.extract_evidence(text, raw.start, raw.end);
                    out.accepted.push(AcceptedCandidate {
                        raw,
                        normalized,
                        window,
                        evidence,
                    });
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Everything;

    impl BoilerplateClassifier for Everything {
        fn is_boilerplate(&self, _text: &str) -> bool {
            true
        }
    }

    #[test]
    fn test_candidates_split_accepted_and_rejected() {
        let extractor = Extractor::new(80).unwrap();
        let found = extractor.candidates("Thank You. Donald Trump met with Jeffrey Epstein.", false);

        let accepted: Vec<&str> = found.accepted.iter().map(|c| c.normalized.as_str()).collect();
        assert_eq!(accepted, vec!["Donald Trump", "Jeffrey Epstein"]);
        assert_eq!(found.rejected.len(), 1);
        assert_eq!(found.rejected[0].reason, RejectReason::Blacklisted);
        assert!(found.accepted[1].evidence.context.contains("met with Jeffrey Epstein"));
    }

    #[test]
    fn test_boilerplate_rejects_everything() {
        let extractor = Extractor::new(80).unwrap().with_boilerplate(Box::new(Everything));
        let found = extractor.candidates("Donald Trump met with Jeffrey Epstein.", false);
        assert!(found.accepted.is_empty());

        let flagged = Extractor::new(80).unwrap().candidates("Sarah Kellen scheduled it.", true);
        assert_eq!(flagged.rejected[0].reason, RejectReason::Boilerplate);
    }

    #[test]
    fn test_quarantine_gate() {
        let extractor = Extractor::new(80).unwrap();
        assert!(extractor.quarantine("Exhibit references CSAM material").is_some());
        assert!(extractor.quarantine("Flight logs for 2002").is_none());
    }
}
