//! In-process store used by tests and dry runs. Same contract as the Neo4j
//! store, including all-or-nothing document commits.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use extract::{
    name_key, CandidateDecision, ClaimTriple, Entity, EntityDraft, Mention, QualityFlag, Relation,
    RelationEvidence, ResolutionCandidate, ResolutionEvent, ResolverRun,
};
use ingest::{Document, Sentence, Span};

use crate::capabilities::Capabilities;
use crate::store::{DocumentUnit, GraphStore, RelationWrite, StoreCounts, Upserted};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentStatus {
    pub status: String,
    pub quarantine_reason: Option<String>,
}

#[derive(Default)]
struct Tables {
    documents: BTreeMap<String, Document>,
    statuses: BTreeMap<String, DocumentStatus>,
    sentences: BTreeMap<String, Vec<Sentence>>,
    entities: BTreeMap<String, Entity>,
    names: HashMap<String, String>,
    spans: BTreeMap<String, Span>,
    mentions: BTreeMap<String, Mention>,
    events: Vec<ResolutionEvent>,
    candidates: BTreeMap<String, ResolutionCandidate>,
    flags: BTreeMap<String, QualityFlag>,
    runs: BTreeMap<String, ResolverRun>,
    relations: BTreeMap<String, Relation>,
    evidence: BTreeMap<String, RelationEvidence>,
    claims: BTreeMap<String, ClaimTriple>,
    failing_commits: HashSet<String>,
}

impl Tables {
    fn drop_entity_edges(&mut self, entity_id: &str) {
        let stale: BTreeSet<String> = self
            .relations
            .values()
            .filter(|r| r.subject_id == entity_id || r.object_id == entity_id)
            .map(|r| r.id.clone())
            .collect();
        self.relations.retain(|id, _| !stale.contains(id));
        self.evidence.retain(|_, ev| !stale.contains(&ev.relation_id));
        self.claims.retain(|_, c| {
            c.subject_id != entity_id && c.object_id.as_deref() != Some(entity_id)
        });
    }
}

pub struct MemoryStore {
    tables: Mutex<Tables>,
    capabilities: Capabilities,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::all())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            capabilities,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("Memory store lock poisoned"))
    }

    pub fn add_document(&self, document: Document) -> Result<()> {
        let mut tables = self.lock()?;
        tables.documents.insert(document.id.clone(), document);
        Ok(())
    }

    pub fn add_sentences(&self, sentences: Vec<Sentence>) -> Result<()> {
        let mut tables = self.lock()?;
        for sentence in sentences {
            tables
                .sentences
                .entry(sentence.document_id.clone())
                .or_default()
                .push(sentence);
        }
        Ok(())
    }

    /// The next commit of `document_id` fails before writing anything.
    pub fn inject_commit_failure(&self, document_id: &str) -> Result<()> {
        self.lock()?.failing_commits.insert(document_id.to_string());
        Ok(())
    }

    pub fn document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.lock()?.documents.get(id).cloned())
    }

    pub fn document_status(&self, id: &str) -> Result<Option<DocumentStatus>> {
        Ok(self.lock()?.statuses.get(id).cloned())
    }

    pub fn mentions(&self) -> Result<Vec<Mention>> {
        Ok(self.lock()?.mentions.values().cloned().collect())
    }

    pub fn events(&self) -> Result<Vec<ResolutionEvent>> {
        Ok(self.lock()?.events.clone())
    }

    pub fn candidates(&self) -> Result<Vec<ResolutionCandidate>> {
        Ok(self.lock()?.candidates.values().cloned().collect())
    }

    /// Record a review decision. `false` when no such candidate exists.
    pub fn set_candidate_decision(&self, id: &str, decision: CandidateDecision) -> Result<bool> {
        let mut tables = self.lock()?;
        Ok(match tables.candidates.get_mut(id) {
            Some(candidate) => {
                candidate.decision = Some(decision);
                true
            }
            None => false,
        })
    }

    pub fn flags(&self) -> Result<Vec<QualityFlag>> {
        Ok(self.lock()?.flags.values().cloned().collect())
    }

    pub fn evidence(&self) -> Result<Vec<RelationEvidence>> {
        Ok(self.lock()?.evidence.values().cloned().collect())
    }

    pub fn runs(&self) -> Result<Vec<ResolverRun>> {
        Ok(self.lock()?.runs.values().cloned().collect())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn capabilities(&self) -> Result<Capabilities> {
        Ok(self.capabilities)
    }

    async fn pending_documents(&self, limit: usize) -> Result<Vec<Document>> {
        let tables = self.lock()?;
        Ok(tables
            .documents
            .values()
            .filter(|d| d.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn sentences_for(&self, document_id: &str) -> Result<Vec<Sentence>> {
        if !self.capabilities.sentences {
            return Ok(Vec::new());
        }
        Ok(self
            .lock()?
            .sentences
            .get(document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_entities(&self) -> Result<Vec<Entity>> {
        Ok(self.lock()?.entities.values().cloned().collect())
    }

    async fn upsert_entity_by_name(&self, draft: &EntityDraft) -> Result<Upserted> {
        let key = name_key(&draft.full_name);
        if key.is_empty() {
            bail!("Refusing to upsert an entity with an empty name");
        }

        let mut tables = self.lock()?;
        if let Some(id) = tables.names.get(&key).cloned() {
            if let Some(existing) = tables.entities.get_mut(&id) {
                existing.aliases.extend(draft.aliases.iter().cloned());
                if existing.risk.is_empty() {
                    existing.risk = draft.risk.clone();
                }
            }
            return Ok(Upserted { id, created: false });
        }

        let id = uuid::Uuid::new_v4().to_string();
        tables.names.insert(key, id.clone());
        tables
            .entities
            .insert(id.clone(), draft.clone().into_entity(id.clone()));
        Ok(Upserted { id, created: true })
    }

    async fn find_entity_by_name(&self, name: &str) -> Result<Option<Entity>> {
        let tables = self.lock()?;
        Ok(tables
            .names
            .get(&name_key(name))
            .and_then(|id| tables.entities.get(id))
            .cloned())
    }

    async fn commit_document(&self, unit: DocumentUnit) -> Result<()> {
        let mut tables = self.lock()?;

        if tables.failing_commits.remove(&unit.document_id) {
            bail!("Injected commit failure for document {}", unit.document_id);
        }
        if !tables.documents.contains_key(&unit.document_id) {
            bail!("Unknown document {}", unit.document_id);
        }
        if let Some(missing) = unit
            .mentions
            .iter()
            .find(|m| !tables.entities.contains_key(&m.entity_id))
        {
            bail!("Mention {} refers to missing entity {}", missing.id, missing.entity_id);
        }

        for span in unit.spans {
            tables.spans.insert(span.id.clone(), span);
        }
        for mention in unit.mentions {
            tables.mentions.insert(mention.id.clone(), mention);
        }
        let seen: HashSet<String> = tables.events.iter().map(|e| e.id.clone()).collect();
        tables
            .events
            .extend(unit.events.into_iter().filter(|e| !seen.contains(&e.id)));
        for candidate in unit.candidates {
            tables.candidates.entry(candidate.id.clone()).or_insert(candidate);
        }
        for flag in unit.flags {
            tables.flags.insert(flag.id.clone(), flag);
        }

        tables.statuses.insert(
            unit.document_id.clone(),
            DocumentStatus {
                status: unit.outcome.status().to_string(),
                quarantine_reason: unit.outcome.reason().map(str::to_string),
            },
        );
        if let Some(document) = tables.documents.get_mut(&unit.document_id) {
            document.analyzed_at = Some(unit.analyzed_at);
        }

        Ok(())
    }

    async fn record_run(&self, run: &ResolverRun) -> Result<()> {
        self.lock()?.runs.insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn documents_with_mentions(&self) -> Result<Vec<String>> {
        let tables = self.lock()?;
        let ids: BTreeSet<String> = tables
            .mentions
            .values()
            .map(|m| m.document_id.clone())
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn mentions_for_document(&self, document_id: &str) -> Result<Vec<Mention>> {
        let tables = self.lock()?;
        Ok(tables
            .mentions
            .values()
            .filter(|m| m.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn spans_for_document(&self, document_id: &str) -> Result<Vec<Span>> {
        let tables = self.lock()?;
        Ok(tables
            .spans
            .values()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn replace_relations(
        &self,
        relations: &[Relation],
        evidence: &[RelationEvidence],
    ) -> Result<RelationWrite> {
        let mut tables = self.lock()?;
        let keep: HashSet<&str> = relations.iter().map(|r| r.id.as_str()).collect();

        let before = tables.relations.len();
        tables.relations.retain(|id, _| keep.contains(id.as_str()));
        let pruned = before - tables.relations.len();

        for relation in relations {
            let mut next = relation.clone();
            if let Some(existing) = tables.relations.get(&relation.id) {
                next.first_seen = existing.first_seen;
            }
            tables.relations.insert(next.id.clone(), next);
        }

        tables.evidence.clear();
        for ev in evidence {
            tables.evidence.insert(ev.id.clone(), ev.clone());
        }

        Ok(RelationWrite {
            written: relations.len(),
            pruned,
        })
    }

    async fn relations(&self) -> Result<Vec<Relation>> {
        Ok(self.lock()?.relations.values().cloned().collect())
    }

    async fn insert_claims(&self, claims: &[ClaimTriple]) -> Result<usize> {
        let mut tables = self.lock()?;
        let mut inserted = 0;
        for claim in claims {
            if !tables.claims.contains_key(&claim.id) {
                tables.claims.insert(claim.id.clone(), claim.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn claims(&self) -> Result<Vec<ClaimTriple>> {
        Ok(self.lock()?.claims.values().cloned().collect())
    }

    async fn update_claim_confidence(&self, updates: &[(String, f64)]) -> Result<()> {
        let mut tables = self.lock()?;
        for (id, confidence) in updates {
            if let Some(claim) = tables.claims.get_mut(id) {
                claim.confidence = *confidence;
            }
        }
        Ok(())
    }

    async fn insert_candidates(&self, candidates: &[ResolutionCandidate]) -> Result<usize> {
        let mut tables = self.lock()?;
        let mut inserted = 0;
        // a stored candidate keeps its reviewed decision
        for candidate in candidates {
            if let Entry::Vacant(slot) = tables.candidates.entry(candidate.id.clone()) {
                slot.insert(candidate.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn delete_entity(&self, entity_id: &str) -> Result<usize> {
        let mut tables = self.lock()?;
        if tables.entities.remove(entity_id).is_none() {
            return Ok(0);
        }
        tables.names.retain(|_, id| id != entity_id);

        let before = tables.mentions.len();
        tables.mentions.retain(|_, m| m.entity_id != entity_id);
        let removed = before - tables.mentions.len();

        tables.drop_entity_edges(entity_id);
        Ok(removed)
    }

    async fn reassign_mentions(&self, from_entity: &str, to_entity: &str) -> Result<usize> {
        let mut tables = self.lock()?;
        if !tables.entities.contains_key(to_entity) {
            bail!("Cannot reassign mentions to missing entity {}", to_entity);
        }

        let mut moved = 0;
        for mention in tables.mentions.values_mut() {
            if mention.entity_id == from_entity {
                mention.entity_id = to_entity.to_string();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn add_alias(&self, entity_id: &str, alias: &str) -> Result<()> {
        let mut tables = self.lock()?;
        let Some(entity) = tables.entities.get_mut(entity_id) else {
            bail!("Cannot add alias to missing entity {}", entity_id);
        };
        entity.aliases.insert(alias.to_string());
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let tables = self.lock()?;
        Ok(StoreCounts {
            documents: tables.documents.len(),
            pending_documents: tables.documents.values().filter(|d| d.is_pending()).count(),
            quarantined_documents: tables
                .statuses
                .values()
                .filter(|s| s.status == "quarantined")
                .count(),
            entities: tables.entities.len(),
            mentions: tables.mentions.len(),
            relations: tables.relations.len(),
            relation_evidence: tables.evidence.len(),
            claims: tables.claims.len(),
            resolution_candidates: tables.candidates.len(),
            quality_flags: tables.flags.len(),
            resolution_events: tables.events.len(),
            runs: tables.runs.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentOutcome;
    use extract::EntityType;

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_name() {
        let store = MemoryStore::new();
        let first = store
            .upsert_entity_by_name(&EntityDraft::new("Sarah Kellen", EntityType::Person))
            .await
            .unwrap();
        let second = store
            .upsert_entity_by_name(&EntityDraft::new("  sarah kellen.", EntityType::Person))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(store.load_entities().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_leaves_nothing_behind() {
        let store = MemoryStore::new();
        store.add_document(Document::new("doc-1", "a.txt", "text")).unwrap();
        store.inject_commit_failure("doc-1").unwrap();

        let unit = DocumentUnit::new("doc-1", DocumentOutcome::Indexed);
        assert!(store.commit_document(unit.clone()).await.is_err());
        assert_eq!(store.pending_documents(10).await.unwrap().len(), 1);

        store.commit_document(unit).await.unwrap();
        assert!(store.pending_documents(10).await.unwrap().is_empty());
        assert_eq!(
            store.document_status("doc-1").unwrap().map(|s| s.status),
            Some("indexed".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_entity_cascades() {
        let store = MemoryStore::new();
        let a = store
            .upsert_entity_by_name(&EntityDraft::new("Hi Jeffrey", EntityType::Person))
            .await
            .unwrap();
        let b = store
            .upsert_entity_by_name(&EntityDraft::new("Sarah Kellen", EntityType::Person))
            .await
            .unwrap();

        let now = chrono::Utc::now();
        let relation = Relation {
            id: Relation::edge_id(&a.id, &b.id, extract::MENTIONED_WITH),
            subject_id: a.id.clone(),
            object_id: b.id.clone(),
            predicate: extract::MENTIONED_WITH.to_string(),
            weight: 1.0,
            status: "active".to_string(),
            first_seen: now,
            last_seen: now,
        };
        store.replace_relations(&[relation], &[]).await.unwrap();

        store.delete_entity(&a.id).await.unwrap();
        assert!(store.relations().await.unwrap().is_empty());
        assert!(store.find_entity_by_name("Hi Jeffrey").await.unwrap().is_none());
        assert!(store.find_entity_by_name("Sarah Kellen").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_replace_relations_keeps_first_seen() {
        let store = MemoryStore::new();
        let early = chrono::Utc::now() - chrono::Duration::days(3);
        let mut relation = Relation {
            id: "rel-1".into(),
            subject_id: "a".into(),
            object_id: "b".into(),
            predicate: extract::MENTIONED_WITH.into(),
            weight: 2.0,
            status: "active".into(),
            first_seen: early,
            last_seen: early,
        };
        store.replace_relations(&[relation.clone()], &[]).await.unwrap();

        relation.first_seen = chrono::Utc::now();
        relation.last_seen = relation.first_seen;
        relation.weight = 1.0;
        let write = store.replace_relations(&[relation], &[]).await.unwrap();

        let stored = store.relations().await.unwrap();
        assert_eq!(write, RelationWrite { written: 1, pruned: 0 });
        assert_eq!(stored[0].first_seen, early);
        assert_eq!(stored[0].weight, 1.0);

        let write = store.replace_relations(&[], &[]).await.unwrap();
        assert_eq!(write.pruned, 1);
    }
}
