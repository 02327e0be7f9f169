use anyhow::{Context, Result};
use async_trait::async_trait;
use index::PipelineContext;
use serde::Serialize;
use tracing::info;

use crate::builder::{RelationStats, RelationshipBuilder};
use crate::claims::{ClaimExtractor, ClaimStats};
use crate::consolidate::{ConsolidationStats, Consolidator};

/// Post-process hook that rescores entity risk once the graph is complete.
#[async_trait]
pub trait RiskRecalibrator: Send + Sync {
    async fn recalibrate(&self, ctx: &PipelineContext) -> Result<()>;
}

pub struct NoopRecalibrator;

#[async_trait]
impl RiskRecalibrator for NoopRecalibrator {
    async fn recalibrate(&self, _ctx: &PipelineContext) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PassReport {
    pub relations: RelationStats,
    pub claims: Option<ClaimStats>,
    pub consolidation: ConsolidationStats,
}

/// The passes that run over the whole graph after extraction.
pub struct GraphPasses {
    builder: RelationshipBuilder,
    claims: ClaimExtractor,
    consolidator: Consolidator,
    recalibrator: Box<dyn RiskRecalibrator>,
}

impl GraphPasses {
    pub fn new(
        builder: RelationshipBuilder,
        claims: ClaimExtractor,
        consolidator: Consolidator,
        recalibrator: Box<dyn RiskRecalibrator>,
    ) -> Self {
        Self {
            builder,
            claims,
            consolidator,
            recalibrator,
        }
    }

    /// Built-in tables sized from the pipeline config.
    pub fn from_context(ctx: &PipelineContext) -> Result<Self> {
        Ok(Self::new(
            RelationshipBuilder::new(ctx.config.explosion_limit),
            ClaimExtractor::new(ctx.config.claim_confidence_floor, ctx.config.explosion_limit)?,
            Consolidator::builtin(),
            Box::new(NoopRecalibrator),
        ))
    }

    pub fn with_recalibrator(mut self, recalibrator: Box<dyn RiskRecalibrator>) -> Self {
        self.recalibrator = recalibrator;
        self
    }

    /// Relationships, claims with corroboration, then consolidation.
    pub async fn run_graph(&self, ctx: &PipelineContext) -> Result<PassReport> {
        let relations = self.builder.rebuild(ctx).await?;

        let claims = if ctx.caps.claims {
            Some(self.claims.extract(ctx).await?)
        } else {
            info!("Claim store unavailable, skipping claim pass");
            None
        };

        let consolidation = self.consolidator.run(ctx).await?;

        Ok(PassReport {
            relations,
            claims,
            consolidation,
        })
    }

    pub async fn recalibrate(&self, ctx: &PipelineContext) -> Result<()> {
        self.recalibrator
            .recalibrate(ctx)
            .await
            .context("Risk recalibration failed")
    }

    /// Every graph pass, with recalibration strictly last.
    pub async fn run(&self, ctx: &PipelineContext) -> Result<PassReport> {
        let report = self.run_graph(ctx).await?;
        self.recalibrate(ctx).await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use index::{DocumentIndexer, MemoryStore, PipelineConfig};
    use ingest::Document;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingRecalibrator {
        relations_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl RiskRecalibrator for CountingRecalibrator {
        async fn recalibrate(&self, ctx: &PipelineContext) -> Result<()> {
            let relations = ctx.store.relations().await?;
            self.relations_seen.store(relations.len(), Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_recalibrator_sees_finished_graph() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_document(Document::new("doc-1", "a.txt", "Ghislaine Maxwell called Jeffrey Epstein."))
            .unwrap();

        let ctx = PipelineContext::open(store, PipelineConfig::default()).await.unwrap();
        let mut indexer = DocumentIndexer::builtin(ctx.config.context_radius).unwrap();
        indexer.prepare(&ctx).await.unwrap();
        indexer.run_batches(&ctx, None).await.unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let passes = GraphPasses::from_context(&ctx).unwrap().with_recalibrator(Box::new(CountingRecalibrator {
            relations_seen: seen.clone(),
        }));
        let report = passes.run(&ctx).await.unwrap();

        assert_eq!(report.relations.relations, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(report.claims.map(|c| c.inserted), Some(1));
    }
}
