use std::collections::BTreeMap;

use anyhow::{Context, Result};
use extract::{name_key, CandidateDecision, CandidateKind, Entity, ResolutionCandidate};
use index::PipelineContext;
use serde::Serialize;
use tracing::{debug, info, warn};

pub const NAME_SIMILARITY_SCORE: f64 = 0.9;
/// Keys must be longer than this before substring containment counts.
pub const MIN_SUBSTRING_KEY_LEN: usize = 10;

/// Greeting fragments that slipped past the junk gate in older runs.
const JUNK_NAMES: &[&str] = &[
    "Hi Jeffrey",
    "Dear Jeffrey",
    "Hello Jeffrey",
    "Thanks Jeffrey",
    "Hi Jeff",
    "Dear Jeff",
    "Hi Ghislaine",
    "Dear Ghislaine",
];

/// (variant, canonical) spellings produced by OCR.
const OCR_VARIANTS: &[(&str, &str)] = &[
    ("Jeffrey Epsteln", "Jeffrey Epstein"),
    ("Jeffery Epstein", "Jeffrey Epstein"),
    ("Jeffrey Epstien", "Jeffrey Epstein"),
    ("Ghislaine Maxwel", "Ghislaine Maxwell"),
    ("Ghislane Maxwell", "Ghislaine Maxwell"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsolidationStats {
    pub junk_deleted: usize,
    pub junk_mentions_deleted: usize,
    pub variants_merged: usize,
    pub mentions_reassigned: usize,
    pub candidates: usize,
}

pub struct Consolidator {
    junk_names: Vec<String>,
    ocr_variants: Vec<(String, String)>,
}

impl Consolidator {
    pub fn new(junk_names: Vec<String>, ocr_variants: Vec<(String, String)>) -> Self {
        Self {
            junk_names,
            ocr_variants,
        }
    }

    pub fn builtin() -> Self {
        Self::new(
            JUNK_NAMES.iter().map(|s| s.to_string()).collect(),
            OCR_VARIANTS
                .iter()
                .map(|(variant, canonical)| (variant.to_string(), canonical.to_string()))
                .collect(),
        )
    }

    pub async fn run(&self, ctx: &PipelineContext) -> Result<ConsolidationStats> {
        let mut stats = ConsolidationStats::default();
        self.delete_junk(ctx, &mut stats).await?;
        self.merge_variants(ctx, &mut stats).await?;

        if ctx.caps.resolution_candidates {
            let entities = ctx
                .store
                .load_entities()
                .await
                .context("Failed to load entities for similarity")?;
            let candidates = similarity_candidates(&entities);
            stats.candidates = ctx.store.insert_candidates(&candidates).await?;
        }

        info!(
            junk_deleted = stats.junk_deleted,
            variants_merged = stats.variants_merged,
            mentions_reassigned = stats.mentions_reassigned,
            candidates = stats.candidates,
            "Consolidation complete"
        );
        Ok(stats)
    }

    async fn delete_junk(&self, ctx: &PipelineContext, stats: &mut ConsolidationStats) -> Result<()> {
        for name in &self.junk_names {
            let Some(entity) = ctx.store.find_entity_by_name(name).await? else {
                continue;
            };
            let mentions = ctx
                .store
                .delete_entity(&entity.id)
                .await
                .with_context(|| format!("Failed to delete junk entity {}", entity.full_name))?;

            debug!(entity = %entity.full_name, mentions, "Deleted junk entity");
            stats.junk_deleted += 1;
            stats.junk_mentions_deleted += mentions;
        }
        Ok(())
    }

    async fn merge_variants(&self, ctx: &PipelineContext, stats: &mut ConsolidationStats) -> Result<()> {
        for (variant_name, canonical_name) in &self.ocr_variants {
            let Some(variant) = ctx.store.find_entity_by_name(variant_name).await? else {
                continue;
            };
            let Some(canonical) = ctx.store.find_entity_by_name(canonical_name).await? else {
                warn!(variant = %variant_name, canonical = %canonical_name, "Canonical entity missing, variant kept");
                continue;
            };
            if variant.id == canonical.id {
                continue;
            }

            let moved = ctx
                .store
                .reassign_mentions(&variant.id, &canonical.id)
                .await
                .with_context(|| format!("Failed to reassign mentions of {}", variant_name))?;
            ctx.store.add_alias(&canonical.id, &variant.full_name).await?;
            ctx.store.delete_entity(&variant.id).await?;

            debug!(variant = %variant_name, canonical = %canonical_name, moved, "Merged OCR variant");
            stats.variants_merged += 1;
            stats.mentions_reassigned += moved;
        }
        Ok(())
    }
}

fn looks_duplicate(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    a.len() > MIN_SUBSTRING_KEY_LEN && b.len() > MIN_SUBSTRING_KEY_LEN && (a.contains(b) || b.contains(a))
}

/// Pending `name_similarity` proposals between same-type entities.
pub fn similarity_candidates(entities: &[Entity]) -> Vec<ResolutionCandidate> {
    let mut by_type: BTreeMap<&str, Vec<(&Entity, String)>> = BTreeMap::new();
    for entity in entities {
        by_type
            .entry(entity.entity_type.as_str())
            .or_default()
            .push((entity, name_key(&entity.full_name)));
    }

    let mut candidates = Vec::new();
    for group in by_type.values_mut() {
        group.sort_by(|a, b| a.0.id.cmp(&b.0.id));

        for (i, (left, left_key)) in group.iter().enumerate() {
            for (right, right_key) in &group[i + 1..] {
                if left.id == right.id || !looks_duplicate(left_key, right_key) {
                    continue;
                }
                let mut features = BTreeMap::new();
                features.insert("exact".to_string(), if left_key == right_key { 1.0 } else { 0.0 });
                features.insert("substring".to_string(), 1.0);

                candidates.push(ResolutionCandidate {
                    id: ResolutionCandidate::candidate_id(CandidateKind::NameSimilarity, &left.id, &right.id),
                    kind: CandidateKind::NameSimilarity,
                    source_id: left.id.clone(),
                    candidate_entity_id: right.id.clone(),
                    score: NAME_SIMILARITY_SCORE,
                    features,
                    decision: Some(CandidateDecision::Pending),
                });
            }
        }
    }
    candidates
}
