use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{Context, Result};
use extract::{corroborated_confidence, ClaimPatterns, ClaimTriple, Mention, BASE_CLAIM_CONFIDENCE};
use index::PipelineContext;
use ingest::Span;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClaimStats {
    pub detected: usize,
    pub inserted: usize,
    pub corroborated: usize,
}

pub struct ClaimExtractor {
    patterns: ClaimPatterns,
    confidence_floor: f64,
    explosion_limit: usize,
}

impl ClaimExtractor {
    pub fn new(confidence_floor: f64, explosion_limit: usize) -> Result<Self> {
        Ok(Self {
            patterns: ClaimPatterns::new()?,
            confidence_floor,
            explosion_limit,
        })
    }

    /// Claims between mention pairs that share a sentence. The earlier
    /// mention is the subject.
    pub fn claims_for_document(&self, document_id: &str, mentions: &[Mention], spans: &[Span]) -> Vec<ClaimTriple> {
        let texts: HashMap<&str, &str> = spans.iter().map(|s| (s.id.as_str(), s.text.as_str())).collect();

        let mut by_sentence: BTreeMap<&str, Vec<&Mention>> = BTreeMap::new();
        for mention in mentions {
            if mention.confidence < self.confidence_floor {
                continue;
            }
            if let Some(sentence) = mention.sentence_id.as_deref() {
                by_sentence.entry(sentence).or_default().push(mention);
            }
        }

        let mut claims = Vec::new();
        let mut seen = BTreeSet::new();

        for (sentence, mut group) in by_sentence {
            let Some(text) = texts.get(sentence) else {
                continue;
            };
            let distinct: BTreeSet<&str> = group.iter().map(|m| m.entity_id.as_str()).collect();
            if distinct.len() < 2 || distinct.len() > self.explosion_limit {
                continue;
            }
            group.sort_by_key(|m| (m.start, m.end));

            for (i, first) in group.iter().enumerate() {
                for second in &group[i + 1..] {
                    if first.entity_id == second.entity_id {
                        continue;
                    }
                    let Some(between) = text.get(first.start..second.end.max(first.end)) else {
                        continue;
                    };

                    for detected in self.patterns.detect(between) {
                        let id = ClaimTriple::triple_id(
                            &first.entity_id,
                            &detected.predicate,
                            &second.entity_id,
                            document_id,
                            sentence,
                        );
                        if !seen.insert(id.clone()) {
                            continue;
                        }
                        claims.push(ClaimTriple {
                            id,
                            subject_id: first.entity_id.clone(),
                            predicate: detected.predicate,
                            object_id: Some(second.entity_id.clone()),
                            object_text: None,
                            document_id: document_id.to_string(),
                            sentence_id: sentence.to_string(),
                            confidence: BASE_CLAIM_CONFIDENCE,
                            modality: detected.modality,
                        });
                    }
                }
            }
        }

        claims
    }

    pub async fn extract(&self, ctx: &PipelineContext) -> Result<ClaimStats> {
        let store = ctx.store.as_ref();
        let mut stats = ClaimStats::default();

        for document_id in store.documents_with_mentions().await? {
            let mentions = store.mentions_for_document(&document_id).await?;
            let spans = store.spans_for_document(&document_id).await?;
            let claims = self.claims_for_document(&document_id, &mentions, &spans);

            stats.detected += claims.len();
            stats.inserted += store
                .insert_claims(&claims)
                .await
                .with_context(|| format!("Failed to insert claims for {}", document_id))?;
        }

        stats.corroborated = self.corroborate(ctx).await?;
        info!(
            detected = stats.detected,
            inserted = stats.inserted,
            corroborated = stats.corroborated,
            "Claim pass complete"
        );
        Ok(stats)
    }

    /// Recompute confidence for claims seen in more than one document.
    pub async fn corroborate(&self, ctx: &PipelineContext) -> Result<usize> {
        let claims = ctx.store.claims().await.context("Failed to load claims")?;
        let updates = corroboration_updates(&claims);
        ctx.store.update_claim_confidence(&updates).await?;
        Ok(updates.len())
    }
}

/// `(claim id, confidence)` for every claim whose (subject, predicate,
/// object) group spans several documents and whose stored value differs.
pub fn corroboration_updates(claims: &[ClaimTriple]) -> Vec<(String, f64)> {
    let mut groups: BTreeMap<(&str, &str, &str), Vec<&ClaimTriple>> = BTreeMap::new();
    for claim in claims {
        groups
            .entry((&claim.subject_id, &claim.predicate, claim.object_key()))
            .or_default()
            .push(claim);
    }

    let mut updates = Vec::new();
    for members in groups.values() {
        let documents: BTreeSet<&str> = members.iter().map(|c| c.document_id.as_str()).collect();
        if documents.len() < 2 {
            continue;
        }
        let confidence = corroborated_confidence(documents.len());
        for claim in members {
            if (claim.confidence - confidence).abs() > f64::EPSILON {
                updates.push((claim.id.clone(), confidence));
            }
        }
    }
    updates
}
