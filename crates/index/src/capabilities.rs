use serde::{Deserialize, Serialize};

/// Optional store features, resolved once at startup. Components check
/// these instead of probing the store per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Upstream sentence rows exist for documents.
    pub sentences: bool,
    pub resolution_candidates: bool,
    pub claims: bool,
    pub quality_flags: bool,
    /// ResolverRun / ResolutionEvent audit trail.
    pub audit_events: bool,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            sentences: true,
            resolution_candidates: true,
            claims: true,
            quality_flags: true,
            audit_events: true,
        }
    }

    /// Only the required tables: documents, entities, mentions, relations.
    pub fn minimal() -> Self {
        Self {
            sentences: false,
            resolution_candidates: false,
            claims: false,
            quality_flags: false,
            audit_events: false,
        }
    }

    /// Capabilities implied by the node labels a store reports.
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let has = |label: &str| labels.iter().any(|l| l.as_ref() == label);
        Self {
            sentences: has("Sentence"),
            resolution_candidates: has("ResolutionCandidate"),
            claims: has("Claim"),
            quality_flags: has("QualityFlag"),
            audit_events: has("ResolutionEvent"),
        }
    }

    pub fn disabled(&self) -> Vec<&'static str> {
        let mut off = Vec::new();
        if !self.sentences {
            off.push("sentences");
        }
        if !self.resolution_candidates {
            off.push("resolution_candidates");
        }
        if !self.claims {
            off.push("claims");
        }
        if !self.quality_flags {
            off.push("quality_flags");
        }
        if !self.audit_events {
            off.push("audit_events");
        }
        off
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_labels() {
        let caps = Capabilities::from_labels(&["Document", "Entity", "Claim", "QualityFlag"]);
        assert!(caps.claims);
        assert!(caps.quality_flags);
        assert!(!caps.sentences);
        assert_eq!(
            caps.disabled(),
            vec!["sentences", "resolution_candidates", "audit_events"]
        );
        assert!(Capabilities::all().disabled().is_empty());
    }
}
