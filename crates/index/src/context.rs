use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use extract::ResolverRun;

use crate::capabilities::Capabilities;
use crate::config::PipelineConfig;
use crate::store::GraphStore;

/// Shared state of one pipeline run, passed explicitly to every stage.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn GraphStore>,
    pub run: ResolverRun,
    pub caps: Capabilities,
    pub config: PipelineConfig,
}

impl PipelineContext {
    /// Introspect the store and open an audited run.
    pub async fn open(store: Arc<dyn GraphStore>, config: PipelineConfig) -> Result<Self> {
        let caps = store
            .capabilities()
            .await
            .context("Failed to introspect store capabilities")?;

        let disabled = caps.disabled();
        if !disabled.is_empty() {
            tracing::warn!(?disabled, "Optional store features unavailable");
        }

        if !config.sentence_split {
            tracing::warn!("Sentence splitting disabled; documents without sentence rows yield no claims");
        }

        let run = ResolverRun::start(config.resolver_version.clone());
        if caps.audit_events {
            store
                .record_run(&run)
                .await
                .context("Failed to record resolver run")?;
        }
        tracing::info!(run_id = %run.id, version = %run.version, "Resolver run started");

        Ok(Self {
            store,
            run,
            caps,
            config,
        })
    }

    pub async fn finish(&mut self, documents_processed: usize) -> Result<()> {
        self.run.finished_at = Some(Utc::now());
        self.run.documents_processed = documents_processed;

        if self.caps.audit_events {
            self.store
                .record_run(&self.run)
                .await
                .context("Failed to close resolver run")?;
        }
        tracing::info!(run_id = %self.run.id, documents = documents_processed, "Resolver run finished");
        Ok(())
    }
}
