use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use ingest::stable_id;
use serde::{Deserialize, Serialize};

pub const MENTIONED_WITH: &str = "mentioned_with";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Media,
    Financial,
    Other,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "Person",
            EntityType::Organization => "Organization",
            EntityType::Location => "Location",
            EntityType::Media => "Media",
            EntityType::Financial => "Financial",
            EntityType::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "person" => EntityType::Person,
            "organization" | "organisation" => EntityType::Organization,
            "location" => EntityType::Location,
            "media" => EntityType::Media,
            "financial" => EntityType::Financial,
            _ => EntityType::Other,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Curated risk metadata carried by VIP entries and entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    #[serde(default)]
    pub risk_level: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub red_flag_rating: Option<u8>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub death_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RiskProfile {
    pub fn is_empty(&self) -> bool {
        self == &RiskProfile::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub full_name: String,
    pub entity_type: EntityType,
    pub aliases: BTreeSet<String>,
    pub risk: RiskProfile,
}

/// What the resolver hands the store when an entity may need creating.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDraft {
    pub full_name: String,
    pub entity_type: EntityType,
    pub aliases: BTreeSet<String>,
    pub risk: RiskProfile,
}

impl EntityDraft {
    pub fn new(full_name: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            full_name: full_name.into(),
            entity_type,
            aliases: BTreeSet::new(),
            risk: RiskProfile::default(),
        }
    }

    pub fn into_entity(self, id: String) -> Entity {
        Entity {
            id,
            full_name: self.full_name,
            entity_type: self.entity_type,
            aliases: self.aliases,
            risk: self.risk,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    VipRule,
    ContextRule,
    AliasCache,
    Heuristic,
}

impl ResolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionMethod::VipRule => "vip_rule",
            ResolutionMethod::ContextRule => "context_rule",
            ResolutionMethod::AliasCache => "alias_cache",
            ResolutionMethod::Heuristic => "heuristic",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "vip_rule" => ResolutionMethod::VipRule,
            "context_rule" => ResolutionMethod::ContextRule,
            "alias_cache" => ResolutionMethod::AliasCache,
            _ => ResolutionMethod::Heuristic,
        }
    }
}

/// Evidence payload persisted with every mention and every resolution event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentionEvidence {
    pub context: String,
    pub surface: String,
    pub normalized: String,
    pub entity_type: EntityType,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub document_id: String,
    pub span_id: String,
    pub entity_id: String,
    pub start: usize,
    pub end: usize,
    pub surface: String,
    pub normalized: String,
    pub entity_type: EntityType,
    pub method: ResolutionMethod,
    pub confidence: f64,
    pub context_before: String,
    pub context_after: String,
    pub sentence_id: Option<String>,
    pub page_id: Option<String>,
    pub evidence: MentionEvidence,
}

impl Mention {
    pub fn mention_id(document_id: &str, span_id: &str, start: usize, end: usize) -> String {
        stable_id(&[document_id, span_id, &start.to_string(), &end.to_string()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Mention resolved against a blocking-index neighbour.
    MentionEntity,
    /// Two entities whose names look like duplicates.
    NameSimilarity,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::MentionEntity => "mention_entity",
            CandidateKind::NameSimilarity => "name_similarity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateDecision {
    Merged,
    Pending,
}

impl CandidateDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateDecision::Merged => "merged",
            CandidateDecision::Pending => "pending",
        }
    }
}

/// Audit record of a proposed link. Never drives resolution by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionCandidate {
    pub id: String,
    pub kind: CandidateKind,
    /// Mention id for `MentionEntity`, entity id for `NameSimilarity`.
    pub source_id: String,
    pub candidate_entity_id: String,
    pub score: f64,
    pub features: BTreeMap<String, f64>,
    pub decision: Option<CandidateDecision>,
}

impl ResolutionCandidate {
    pub fn candidate_id(kind: CandidateKind, source_id: &str, candidate_entity_id: &str) -> String {
        stable_id(&[kind.as_str(), source_id, candidate_entity_id])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: String,
    pub subject_id: String,
    pub object_id: String,
    pub predicate: String,
    pub weight: f64,
    pub status: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Relation {
    /// Order-independent edge id: the pair is sorted before hashing.
    pub fn edge_id(a: &str, b: &str, predicate: &str) -> String {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        stable_id(&[low, high, predicate])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEvidence {
    pub id: String,
    pub relation_id: String,
    pub document_id: String,
    pub span_id: String,
    pub quote: String,
    pub confidence: f64,
    pub mention_ids: Vec<String>,
}

impl RelationEvidence {
    pub fn evidence_id(relation_id: &str, document_id: &str, mention_a: &str, mention_b: &str) -> String {
        stable_id(&[relation_id, document_id, mention_a, mention_b])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Asserted,
    Denied,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Asserted => "asserted",
            Modality::Denied => "denied",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "denied" => Modality::Denied,
            _ => Modality::Asserted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimTriple {
    pub id: String,
    pub subject_id: String,
    pub predicate: String,
    pub object_id: Option<String>,
    pub object_text: Option<String>,
    pub document_id: String,
    pub sentence_id: String,
    pub confidence: f64,
    pub modality: Modality,
}

impl ClaimTriple {
    pub fn triple_id(subject: &str, predicate: &str, object: &str, document_id: &str, sentence_id: &str) -> String {
        stable_id(&[subject, predicate, object, document_id, sentence_id])
    }

    /// Entity id or literal text, whichever the claim points at.
    pub fn object_key(&self) -> &str {
        self.object_id
            .as_deref()
            .or(self.object_text.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::High => "high",
        }
    }
}

/// Advisory, non-blocking data-quality marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFlag {
    pub id: String,
    pub target_type: String,
    pub target_id: String,
    pub flag_type: String,
    pub severity: Severity,
    pub details: serde_json::Value,
}

impl QualityFlag {
    pub fn new(
        target_type: &str,
        target_id: &str,
        flag_type: &str,
        severity: Severity,
        details: serde_json::Value,
    ) -> Self {
        let id = stable_id(&[target_type, target_id, flag_type, &details.to_string()]);
        Self {
            id,
            target_type: target_type.to_string(),
            target_id: target_id.to_string(),
            flag_type: flag_type.to_string(),
            severity,
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverRun {
    pub id: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub documents_processed: usize,
}

impl ResolverRun {
    pub fn start(version: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            version: version.into(),
            started_at: Utc::now(),
            finished_at: None,
            documents_processed: 0,
        }
    }
}

/// Append-only record of one resolution decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionEvent {
    pub id: String,
    pub run_id: String,
    pub version: String,
    pub mention_id: String,
    pub entity_id: String,
    pub method: ResolutionMethod,
    pub confidence: f64,
    pub evidence: MentionEvidence,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_id_is_symmetric() {
        let ab = Relation::edge_id("entity-a", "entity-b", MENTIONED_WITH);
        let ba = Relation::edge_id("entity-b", "entity-a", MENTIONED_WITH);
        assert_eq!(ab, ba);
        assert_ne!(ab, Relation::edge_id("entity-a", "entity-c", MENTIONED_WITH));
    }

    #[test]
    fn test_entity_type_parse_is_lenient() {
        assert_eq!(EntityType::parse("PERSON"), EntityType::Person);
        assert_eq!(EntityType::parse("organisation"), EntityType::Organization);
        assert_eq!(EntityType::parse("vessel"), EntityType::Other);
    }

    #[test]
    fn test_claim_object_key_prefers_entity() {
        let claim = ClaimTriple {
            id: "c".into(),
            subject_id: "s".into(),
            predicate: "contacted".into(),
            object_id: Some("o".into()),
            object_text: Some("ignored".into()),
            document_id: "d".into(),
            sentence_id: "sent".into(),
            confidence: 0.7,
            modality: Modality::Asserted,
        };
        assert_eq!(claim.object_key(), "o");
    }
}
