use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use extract::{Mention, Relation, RelationEvidence, MENTIONED_WITH};
use index::PipelineContext;
use ingest::Span;
use serde::Serialize;
use tracing::{debug, info};

pub const SENTENCE_WEIGHT: f64 = 1.0;
pub const PAGE_WEIGHT: f64 = 0.4;
pub const DOCUMENT_WEIGHT: f64 = 0.15;

/// Co-occurrence scope, narrowest last so `max` picks the tightest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scope {
    Document,
    Page,
    Sentence,
}

impl Scope {
    pub fn weight(&self) -> f64 {
        match self {
            Scope::Sentence => SENTENCE_WEIGHT,
            Scope::Page => PAGE_WEIGHT,
            Scope::Document => DOCUMENT_WEIGHT,
        }
    }
}

/// Narrowest shared scope of one entity pair within one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub scope: Scope,
    /// Sentence or page id for the narrower scopes.
    pub key: Option<String>,
}

/// Entity ids grouped by the scopes they appear in.
#[derive(Debug, Default)]
struct ScopeGroups<'a> {
    sentences: BTreeMap<&'a str, BTreeSet<&'a str>>,
    pages: BTreeMap<&'a str, BTreeSet<&'a str>>,
    document: BTreeSet<&'a str>,
}

impl<'a> ScopeGroups<'a> {
    fn from_mentions(mentions: &'a [Mention]) -> Self {
        let mut groups = Self::default();
        for mention in mentions {
            let entity = mention.entity_id.as_str();
            if let Some(sentence) = mention.sentence_id.as_deref() {
                groups.sentences.entry(sentence).or_default().insert(entity);
            }
            if let Some(page) = mention.page_id.as_deref() {
                groups.pages.entry(page).or_default().insert(entity);
            }
            groups.document.insert(entity);
        }
        groups
    }
}

fn sorted_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[derive(Debug, Default)]
pub struct DocumentObservations {
    pub pairs: BTreeMap<(String, String), Observation>,
    /// Scopes skipped by the explosion guard.
    pub skipped_scopes: usize,
}

/// Every co-occurring pair in one document with its narrowest scope.
pub fn observe_document(mentions: &[Mention], explosion_limit: usize) -> DocumentObservations {
    let groups = ScopeGroups::from_mentions(mentions);
    let mut out = DocumentObservations::default();

    let expand = |entities: &BTreeSet<&str>, scope: Scope, key: Option<&str>, out: &mut DocumentObservations| {
        if entities.len() > explosion_limit {
            out.skipped_scopes += 1;
            return;
        }
        let ids: Vec<&str> = entities.iter().copied().collect();
        for (i, a) in ids.iter().enumerate() {
            for b in &ids[i + 1..] {
                let observation = Observation {
                    scope,
                    key: key.map(str::to_string),
                };
                out.pairs
                    .entry(sorted_pair(a, b))
                    .and_modify(|existing| {
                        if observation.scope > existing.scope {
                            *existing = observation.clone();
                        }
                    })
                    .or_insert(observation);
            }
        }
    };

    expand(&groups.document, Scope::Document, None, &mut out);
    for (page, entities) in &groups.pages {
        expand(entities, Scope::Page, Some(*page), &mut out);
    }
    for (sentence, entities) in &groups.sentences {
        expand(entities, Scope::Sentence, Some(*sentence), &mut out);
    }

    out
}

fn in_scope(mention: &Mention, observation: &Observation) -> bool {
    match (observation.scope, observation.key.as_deref()) {
        (Scope::Sentence, Some(key)) => mention.sentence_id.as_deref() == Some(key),
        (Scope::Page, Some(key)) => mention.page_id.as_deref() == Some(key),
        _ => true,
    }
}

/// Highest-confidence mention of `entity` inside the observation scope;
/// earliest wins ties.
fn best_mention<'a>(mentions: &'a [Mention], entity: &str, observation: &Observation) -> Option<&'a Mention> {
    mentions
        .iter()
        .filter(|m| m.entity_id == entity && in_scope(m, observation))
        .min_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.span_id.cmp(&b.span_id))
                .then_with(|| a.start.cmp(&b.start))
        })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelationStats {
    pub documents: usize,
    pub relations: usize,
    pub evidence: usize,
    pub pruned: usize,
    pub skipped_scopes: usize,
}

/// Rebuilds `mentioned_with` edges from the full mention set.
pub struct RelationshipBuilder {
    explosion_limit: usize,
}

impl RelationshipBuilder {
    pub fn new(explosion_limit: usize) -> Self {
        Self { explosion_limit }
    }

    /// Edges and evidence contributed by one document.
    pub fn document_edges(
        &self,
        document_id: &str,
        mentions: &[Mention],
        spans: &[Span],
        now: DateTime<Utc>,
    ) -> (Vec<Relation>, Vec<RelationEvidence>, usize) {
        let observed = observe_document(mentions, self.explosion_limit);
        let span_text: HashMap<&str, &str> = spans.iter().map(|s| (s.id.as_str(), s.text.as_str())).collect();

        let mut relations = Vec::new();
        let mut evidence = Vec::new();

        for ((a, b), observation) in &observed.pairs {
            let id = Relation::edge_id(a, b, MENTIONED_WITH);
            relations.push(Relation {
                id: id.clone(),
                subject_id: a.clone(),
                object_id: b.clone(),
                predicate: MENTIONED_WITH.to_string(),
                weight: observation.scope.weight(),
                status: "active".to_string(),
                first_seen: now,
                last_seen: now,
            });

            let (Some(ma), Some(mb)) = (
                best_mention(mentions, a, observation),
                best_mention(mentions, b, observation),
            ) else {
                continue;
            };

            let quote = match (observation.scope, observation.key.as_deref()) {
                (Scope::Sentence, Some(sentence)) => span_text
                    .get(sentence)
                    .map(|text| text.to_string())
                    .unwrap_or_else(|| ma.evidence.context.clone()),
                _ => format!("{} ... {}", ma.evidence.context, mb.evidence.context),
            };

            evidence.push(RelationEvidence {
                id: RelationEvidence::evidence_id(&id, document_id, &ma.id, &mb.id),
                relation_id: id,
                document_id: document_id.to_string(),
                span_id: ma.span_id.clone(),
                quote,
                confidence: ma.confidence.min(mb.confidence),
                mention_ids: vec![ma.id.clone(), mb.id.clone()],
            });
        }

        (relations, evidence, observed.skipped_scopes)
    }

    /// Full recompute: weights are summed across documents and written with
    /// replace semantics, so reruns never inflate them.
    pub async fn rebuild(&self, ctx: &PipelineContext) -> Result<RelationStats> {
        let store = ctx.store.as_ref();
        let now = Utc::now();
        let mut stats = RelationStats::default();
        let mut merged: BTreeMap<String, Relation> = BTreeMap::new();
        let mut all_evidence = Vec::new();

        let documents = store
            .documents_with_mentions()
            .await
            .context("Failed to list documents with mentions")?;

        for document_id in &documents {
            let mentions = store.mentions_for_document(document_id).await?;
            let spans = store.spans_for_document(document_id).await?;
            let (relations, evidence, skipped) = self.document_edges(document_id, &mentions, &spans, now);

            debug!(document_id = %document_id, pairs = relations.len(), skipped, "Document co-occurrence");
            stats.documents += 1;
            stats.skipped_scopes += skipped;

            for relation in relations {
                merged
                    .entry(relation.id.clone())
                    .and_modify(|existing| existing.weight += relation.weight)
                    .or_insert(relation);
            }
            all_evidence.extend(evidence);
        }

        let relations: Vec<Relation> = merged.into_values().collect();
        let write = store
            .replace_relations(&relations, &all_evidence)
            .await
            .context("Failed to write relations")?;

        stats.relations = write.written;
        stats.pruned = write.pruned;
        stats.evidence = all_evidence.len();

        info!(
            relations = stats.relations,
            evidence = stats.evidence,
            pruned = stats.pruned,
            skipped_scopes = stats.skipped_scopes,
            "Relationship pass complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::{EntityType, MentionEvidence, ResolutionMethod};

    fn mention(id: &str, entity: &str, sentence: Option<&str>, page: Option<&str>, confidence: f64) -> Mention {
        Mention {
            id: id.into(),
            document_id: "doc".into(),
            span_id: sentence.unwrap_or("whole").into(),
            entity_id: entity.into(),
            start: 0,
            end: 1,
            surface: entity.into(),
            normalized: entity.into(),
            entity_type: EntityType::Person,
            method: ResolutionMethod::Heuristic,
            confidence,
            context_before: String::new(),
            context_after: String::new(),
            sentence_id: sentence.map(str::to_string),
            page_id: page.map(str::to_string),
            evidence: MentionEvidence {
                context: format!("context of {}", id),
                surface: entity.into(),
                normalized: entity.into(),
                entity_type: EntityType::Person,
                score: 1.0,
            },
        }
    }

    #[test]
    fn test_narrowest_scope_wins() {
        let mentions = vec![
            mention("m1", "a", Some("s1"), Some("p1"), 0.8),
            mention("m2", "b", Some("s1"), Some("p1"), 0.8),
            mention("m3", "c", Some("s2"), Some("p1"), 0.8),
            mention("m4", "d", Some("s3"), Some("p2"), 0.8),
        ];
        let observed = observe_document(&mentions, 50);

        let scope = |a: &str, b: &str| observed.pairs[&sorted_pair(a, b)].scope;
        assert_eq!(scope("a", "b"), Scope::Sentence);
        assert_eq!(scope("a", "c"), Scope::Page);
        assert_eq!(scope("a", "d"), Scope::Document);
        assert_eq!(observed.pairs.len(), 6);
    }

    #[test]
    fn test_explosion_guard_skips_large_scopes() {
        let mentions: Vec<Mention> = (0..4)
            .map(|i| mention(&format!("m{}", i), &format!("e{}", i), Some("s1"), None, 0.8))
            .collect();

        let observed = observe_document(&mentions, 3);
        assert!(observed.pairs.is_empty());
        assert_eq!(observed.skipped_scopes, 2);
    }

    #[test]
    fn test_evidence_uses_best_mentions() {
        let mentions = vec![
            mention("m1", "a", Some("s1"), None, 0.5),
            mention("m2", "a", Some("s1"), None, 1.0),
            mention("m3", "b", Some("s1"), None, 0.8),
        ];
        let span = Span {
            id: "s1".into(),
            document_id: "doc".into(),
            kind: ingest::SpanKind::Sentence,
            start: 0,
            end: 20,
            text: "a and b were there.".into(),
            cleaned_text: "a and b were there.".into(),
            page_id: None,
        };

        let builder = RelationshipBuilder::new(50);
        let (relations, evidence, _) = builder.document_edges("doc", &mentions, &[span], Utc::now());

        assert_eq!(relations.len(), 1);
        assert_eq!(relations[0].weight, SENTENCE_WEIGHT);
        assert_eq!(evidence[0].mention_ids, vec!["m2".to_string(), "m3".to_string()]);
        assert_eq!(evidence[0].quote, "a and b were there.");
        assert_eq!(evidence[0].confidence, 0.8);
    }
}
