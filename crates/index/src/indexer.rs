use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::Utc;
use extract::{
    AcceptedCandidate, CandidateDecision, CandidateKind, Extractor, Mention, MentionEvidence,
    QualityFlag, ResolutionCandidate, ResolutionEvent, Resolver, Severity,
};
use ingest::{stable_id, Document, Sentence, Span, SpanKind};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::context::PipelineContext;
use crate::registry::{EntityRegistry, Link, Linked};
use crate::store::{DocumentOutcome, DocumentUnit};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentReport {
    pub document_id: String,
    pub quarantined: bool,
    pub spans: usize,
    pub mentions: usize,
    pub entities_created: usize,
    pub rejected: usize,
    pub unresolved: usize,
    pub throttled: usize,
    pub low_ocr_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    pub batches: usize,
    pub documents: usize,
    pub quarantined: usize,
    pub mentions: usize,
    pub entities_created: usize,
    pub rejected: usize,
    pub unresolved: usize,
    pub throttled: usize,
}

impl BatchStats {
    fn absorb(&mut self, report: &DocumentReport) {
        self.documents += 1;
        self.quarantined += report.quarantined as usize;
        self.mentions += report.mentions;
        self.entities_created += report.entities_created;
        self.rejected += report.rejected;
        self.unresolved += report.unresolved;
        self.throttled += report.throttled;
    }
}

/// Per-document extraction and persistence. Each document is one atomic
/// unit committed together with its watermark.
pub struct DocumentIndexer {
    extractor: Extractor,
    registry: EntityRegistry,
}

impl DocumentIndexer {
    pub fn new(extractor: Extractor, registry: EntityRegistry) -> Self {
        Self { extractor, registry }
    }

    pub fn builtin(context_radius: usize) -> Result<Self> {
        Ok(Self::new(
            Extractor::new(context_radius)?,
            EntityRegistry::new(Resolver::builtin()?),
        ))
    }

    pub async fn prepare(&mut self, ctx: &PipelineContext) -> Result<usize> {
        self.registry.warm(ctx.store.as_ref()).await
    }

    /// Process pending documents until none remain (or `max_batches` is
    /// reached). A failing document aborts the batch with its watermark
    /// unmoved.
    pub async fn run_batches(
        &mut self,
        ctx: &PipelineContext,
        max_batches: Option<usize>,
    ) -> Result<BatchStats> {
        let mut stats = BatchStats::default();

        while max_batches.is_none_or(|max| stats.batches < max) {
            let documents = ctx
                .store
                .pending_documents(ctx.config.batch_size)
                .await
                .context("Failed to fetch pending documents")?;
            if documents.is_empty() {
                break;
            }

            stats.batches += 1;
            info!(batch = stats.batches, documents = documents.len(), "Processing batch");

            for document in &documents {
                let report = self
                    .process_document(ctx, document)
                    .await
                    .with_context(|| format!("Failed to index document {}", document.id))?;
                stats.absorb(&report);
            }
        }

        info!(
            documents = stats.documents,
            mentions = stats.mentions,
            entities_created = stats.entities_created,
            quarantined = stats.quarantined,
            "Extraction batches complete"
        );
        Ok(stats)
    }

    pub async fn process_document(
        &mut self,
        ctx: &PipelineContext,
        document: &Document,
    ) -> Result<DocumentReport> {
        let mut report = DocumentReport {
            document_id: document.id.clone(),
            ..Default::default()
        };

        if let Some(verdict) = self.extractor.quarantine(&document.content) {
            warn!(document_id = %document.id, reason = %verdict.reason, "Document quarantined");

            let mut unit = DocumentUnit::new(
                &document.id,
                DocumentOutcome::Quarantined {
                    reason: verdict.reason.clone(),
                },
            );
            if ctx.caps.quality_flags {
                unit.flags.push(QualityFlag::new(
                    "document",
                    &document.id,
                    "quarantined",
                    Severity::High,
                    json!({ "reason": verdict.reason }),
                ));
            }
            ctx.store.commit_document(unit).await?;

            report.quarantined = true;
            return Ok(report);
        }

        let sentences = if ctx.caps.sentences {
            ctx.store
                .sentences_for(&document.id)
                .await
                .context("Failed to load sentences")?
        } else {
            Vec::new()
        };
        let by_id: HashMap<&str, &Sentence> = sentences.iter().map(|s| (s.id.as_str(), s)).collect();
        let spans = ingest::spans_for(document, &sentences, ctx.config.sentence_split);

        let mut unit = DocumentUnit::new(&document.id, DocumentOutcome::Indexed);
        let mut attempts = 0usize;

        for span in spans {
            let sentence = by_id.get(span.id.as_str()).copied();

            if let Some(score) = sentence.and_then(|s| s.ocr_quality_score) {
                if score < ctx.config.low_ocr_threshold {
                    debug!(sentence_id = %span.id, score, "Skipping low-OCR sentence");
                    if ctx.caps.quality_flags {
                        unit.flags.push(QualityFlag::new(
                            "sentence",
                            &span.id,
                            "low_ocr_quality",
                            Severity::Warning,
                            json!({ "ocr_quality_score": score, "document_id": document.id }),
                        ));
                    }
                    report.low_ocr_skipped += 1;
                    continue;
                }
            }

            let flagged = sentence.is_some_and(|s| s.is_boilerplate);
            let found = self.extractor.candidates(&span.text, flagged);
            report.rejected += found.rejected.len();

            for candidate in found.accepted {
                let resolution = self.registry.resolve_name(
                    &candidate.normalized,
                    &span.text,
                    candidate.raw.start..candidate.raw.end,
                );

                if !resolution.is_vip() {
                    attempts += 1;
                    if attempts > ctx.config.mention_throttle {
                        report.throttled += 1;
                        continue;
                    }
                }

                let link = self
                    .registry
                    .link(ctx.store.as_ref(), resolution, ctx.config.candidate_limit)
                    .await?;

                let linked = match link {
                    Link::Linked(linked) => linked,
                    Link::Unresolved => {
                        report.unresolved += 1;
                        if ctx.caps.quality_flags {
                            unit.flags.push(QualityFlag::new(
                                "document",
                                &document.id,
                                "unresolved_candidate",
                                Severity::Info,
                                json!({
                                    "surface": candidate.raw.surface,
                                    "span_id": span.id,
                                    "context": candidate.evidence.context,
                                }),
                            ));
                        }
                        continue;
                    }
                };

                report.entities_created += linked.created as usize;
                self.record_mention(ctx, &mut unit, document, &span, candidate, linked);
                report.mentions += 1;
            }

            unit.spans.push(span);
        }

        if report.throttled > 0 {
            warn!(
                document_id = %document.id,
                cap = ctx.config.mention_throttle,
                dropped = report.throttled,
                "Mention throttle hit"
            );
            if ctx.caps.quality_flags {
                unit.flags.push(QualityFlag::new(
                    "document",
                    &document.id,
                    "mention_throttle",
                    Severity::Warning,
                    json!({ "cap": ctx.config.mention_throttle, "dropped": report.throttled }),
                ));
            }
        }

        report.spans = unit.spans.len();
        ctx.store.commit_document(unit).await?;

        debug!(
            document_id = %document.id,
            mentions = report.mentions,
            created = report.entities_created,
            "Document committed"
        );
        Ok(report)
    }

    fn record_mention(
        &self,
        ctx: &PipelineContext,
        unit: &mut DocumentUnit,
        document: &Document,
        span: &Span,
        candidate: AcceptedCandidate,
        linked: Linked,
    ) {
        let raw = candidate.raw;
        let id = Mention::mention_id(&document.id, &span.id, raw.start, raw.end);
        let evidence = MentionEvidence {
            context: candidate.evidence.context,
            surface: raw.surface.clone(),
            normalized: candidate.normalized.clone(),
            entity_type: linked.entity_type,
            score: candidate.evidence.score,
        };

        if ctx.caps.audit_events {
            unit.events.push(ResolutionEvent {
                id: stable_id(&[&ctx.run.id, &id]),
                run_id: ctx.run.id.clone(),
                version: ctx.run.version.clone(),
                mention_id: id.clone(),
                entity_id: linked.entity_id.clone(),
                method: linked.method,
                confidence: linked.confidence,
                evidence: evidence.clone(),
                created_at: Utc::now(),
            });
        }

        if ctx.caps.resolution_candidates {
            unit.candidates.extend(linked.candidates.iter().map(|scored| ResolutionCandidate {
                id: ResolutionCandidate::candidate_id(CandidateKind::MentionEntity, &id, &scored.entity_id),
                kind: CandidateKind::MentionEntity,
                source_id: id.clone(),
                candidate_entity_id: scored.entity_id.clone(),
                score: scored.score,
                features: scored.features.clone(),
                decision: (scored.entity_id == linked.entity_id).then_some(CandidateDecision::Merged),
            }));
        }

        unit.mentions.push(Mention {
            id,
            document_id: document.id.clone(),
            span_id: span.id.clone(),
            entity_id: linked.entity_id,
            start: raw.start,
            end: raw.end,
            surface: raw.surface,
            normalized: candidate.normalized,
            entity_type: linked.entity_type,
            method: linked.method,
            confidence: linked.confidence,
            context_before: candidate.window.before,
            context_after: candidate.window.after,
            sentence_id: (span.kind == SpanKind::Sentence).then(|| span.id.clone()),
            page_id: span.page_id.clone(),
            evidence,
        });
    }
}
