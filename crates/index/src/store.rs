use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use extract::{
    ClaimTriple, Entity, EntityDraft, Mention, QualityFlag, Relation, RelationEvidence,
    ResolutionCandidate, ResolutionEvent, ResolverRun,
};
use ingest::{Document, Sentence, Span};
use serde::Serialize;

use crate::capabilities::Capabilities;

/// Result of `upsert_entity_by_name`: the id now bound to the name, and
/// whether this call created it. A name race is never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    Indexed,
    Quarantined { reason: String },
}

impl DocumentOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            DocumentOutcome::Indexed => "indexed",
            DocumentOutcome::Quarantined { .. } => "quarantined",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            DocumentOutcome::Indexed => None,
            DocumentOutcome::Quarantined { reason } => Some(reason),
        }
    }
}

/// Everything one document produces. Committed all-or-nothing together
/// with the `analyzed_at` watermark.
#[derive(Debug, Clone)]
pub struct DocumentUnit {
    pub document_id: String,
    pub outcome: DocumentOutcome,
    pub analyzed_at: DateTime<Utc>,
    pub spans: Vec<Span>,
    pub mentions: Vec<Mention>,
    pub events: Vec<ResolutionEvent>,
    pub candidates: Vec<ResolutionCandidate>,
    pub flags: Vec<QualityFlag>,
}

impl DocumentUnit {
    pub fn new(document_id: impl Into<String>, outcome: DocumentOutcome) -> Self {
        Self {
            document_id: document_id.into(),
            outcome,
            analyzed_at: Utc::now(),
            spans: Vec::new(),
            mentions: Vec::new(),
            events: Vec::new(),
            candidates: Vec::new(),
            flags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelationWrite {
    pub written: usize,
    pub pruned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub documents: usize,
    pub pending_documents: usize,
    pub quarantined_documents: usize,
    pub entities: usize,
    pub mentions: usize,
    pub relations: usize,
    pub relation_evidence: usize,
    pub claims: usize,
    pub resolution_candidates: usize,
    pub quality_flags: usize,
    pub resolution_events: usize,
    pub runs: usize,
}

/// Storage seam for the whole pipeline. One writer at a time.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn capabilities(&self) -> Result<Capabilities>;

    /// Documents whose watermark is unset, oldest id first.
    async fn pending_documents(&self, limit: usize) -> Result<Vec<Document>>;

    async fn sentences_for(&self, document_id: &str) -> Result<Vec<Sentence>>;

    async fn load_entities(&self) -> Result<Vec<Entity>>;

    /// Returns the entity already holding this normalized name, or creates
    /// one. Aliases and empty risk fields of an existing entity are merged.
    async fn upsert_entity_by_name(&self, draft: &EntityDraft) -> Result<Upserted>;

    async fn find_entity_by_name(&self, name: &str) -> Result<Option<Entity>>;

    async fn commit_document(&self, unit: DocumentUnit) -> Result<()>;

    async fn record_run(&self, run: &ResolverRun) -> Result<()>;

    async fn documents_with_mentions(&self) -> Result<Vec<String>>;

    async fn mentions_for_document(&self, document_id: &str) -> Result<Vec<Mention>>;

    async fn spans_for_document(&self, document_id: &str) -> Result<Vec<Span>>;

    /// Replace the relation set: existing edges keep `first_seen`, missing
    /// ones are deleted with their evidence.
    async fn replace_relations(
        &self,
        relations: &[Relation],
        evidence: &[RelationEvidence],
    ) -> Result<RelationWrite>;

    async fn relations(&self) -> Result<Vec<Relation>>;

    /// Inserts claims whose id is new; returns how many were inserted.
    async fn insert_claims(&self, claims: &[ClaimTriple]) -> Result<usize>;

    async fn claims(&self) -> Result<Vec<ClaimTriple>>;

    async fn update_claim_confidence(&self, updates: &[(String, f64)]) -> Result<()>;

    async fn insert_candidates(&self, candidates: &[ResolutionCandidate]) -> Result<usize>;

    /// Deletes the entity, its mentions, and every relation or claim that
    /// touches it. Returns the number of mentions removed.
    async fn delete_entity(&self, entity_id: &str) -> Result<usize>;

    async fn reassign_mentions(&self, from_entity: &str, to_entity: &str) -> Result<usize>;

    async fn add_alias(&self, entity_id: &str, alias: &str) -> Result<()>;

    async fn counts(&self) -> Result<StoreCounts>;
}
