mod config;
mod metrics;
mod retry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use extract::{Extractor, Resolver, VipTable};
use index::{DocumentIndexer, EntityRegistry, GraphStore, Neo4jStore, PipelineContext};
use relations::GraphPasses;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppConfig, OperationMode};
use crate::metrics::{Metrics, TimedOperation};
use crate::retry::RetryPolicy;

#[derive(Parser)]
#[command(name = "runner")]
#[command(about = "Entity extraction and resolution over the document graph")]
#[command(version)]
struct Cli {
    /// JSON config file; defaults apply for missing keys
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Preset used when no config file is given
    #[arg(long, global = true, value_parser = parse_mode)]
    mode: Option<OperationMode>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialise the schema, extract pending documents, then run the graph passes
    Run {
        /// Stop after this many batches
        #[arg(long)]
        max_batches: Option<usize>,
    },

    /// Extraction batches only
    Extract {
        #[arg(long)]
        max_batches: Option<usize>,
    },

    /// Relationship, claim and consolidation passes only
    Graph,

    /// Print table counts as JSON
    Stats,
}

fn parse_mode(value: &str) -> Result<OperationMode, String> {
    match value {
        "fast" => Ok(OperationMode::Fast),
        "thorough" => Ok(OperationMode::Thorough),
        "balanced" => Ok(OperationMode::Balanced),
        other => Err(format!("unknown mode '{}' (fast, thorough, balanced)", other)),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,neo4rs=warn".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::preset(cli.mode.unwrap_or(OperationMode::Balanced)),
    };
    config.apply_env();
    Ok(config)
}

fn build_indexer(config: &AppConfig) -> Result<DocumentIndexer> {
    let resolver = match &config.vip_table {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read VIP table {}", path.display()))?;
            let vip = VipTable::from_json(&raw)?;
            if vip.is_empty() {
                tracing::warn!(path = %path.display(), "VIP table is empty");
            } else {
                tracing::info!(path = %path.display(), entries = vip.len(), "Loaded VIP table");
            }
            Resolver::with_vip(vip)?
        }
        None => Resolver::builtin()?,
    };

    Ok(DocumentIndexer::new(
        Extractor::new(config.pipeline.context_radius)?,
        EntityRegistry::new(resolver),
    ))
}

async fn connect(config: &AppConfig) -> Result<Arc<Neo4jStore>> {
    let policy = RetryPolicy::from_config(&config.retry);
    let neo4j = &config.neo4j;

    let store = policy
        .retry("neo4j_connect", || {
            Neo4jStore::connect(&neo4j.uri, &neo4j.user, &neo4j.password)
        })
        .await
        .with_context(|| format!("Failed to connect to Neo4j at {}", neo4j.uri))?;
    tracing::info!(uri = %neo4j.uri, "Neo4j connected");

    Ok(Arc::new(store))
}

async fn run_extraction(ctx: &PipelineContext, config: &AppConfig, max_batches: Option<usize>, metrics: &Metrics) -> Result<usize> {
    let mut indexer = build_indexer(config)?;
    let warmed = indexer.prepare(ctx).await?;
    tracing::info!(entities = warmed, "Entity caches warmed");

    let timer = TimedOperation::start();
    let stats = indexer.run_batches(ctx, max_batches).await?;
    metrics.record_extract(timer.elapsed(), &stats);
    Ok(stats.documents)
}

async fn run_graph_passes(ctx: &PipelineContext, metrics: &Metrics) -> Result<()> {
    let passes = GraphPasses::from_context(ctx)?;

    let timer = TimedOperation::start();
    let report = passes.run_graph(ctx).await?;
    metrics.record_graph(timer.elapsed(), &report);

    let timer = TimedOperation::start();
    passes.recalibrate(ctx).await?;
    metrics.record_recalibrate(timer.elapsed());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = load_config(&cli)?;
    tracing::info!(mode = ?config.mode, version = %config.pipeline.resolver_version, "Configuration loaded");

    let store = connect(&config).await?;

    if let Commands::Stats = cli.command {
        let counts = store.counts().await.context("Failed to count store rows")?;
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    if let Commands::Run { .. } = cli.command {
        store.init_schema().await.context("Failed to initialise schema")?;
        tracing::info!("Schema ready");
    }

    let mut ctx = PipelineContext::open(store.clone(), config.pipeline.clone()).await?;
    let metrics = Metrics::new();

    let documents = match cli.command {
        Commands::Run { max_batches } => {
            let documents = run_extraction(&ctx, &config, max_batches, &metrics).await?;
            run_graph_passes(&ctx, &metrics).await?;
            documents
        }
        Commands::Extract { max_batches } => run_extraction(&ctx, &config, max_batches, &metrics).await?,
        Commands::Graph => {
            run_graph_passes(&ctx, &metrics).await?;
            0
        }
        Commands::Stats => 0,
    };

    ctx.finish(documents).await?;
    println!("{}", serde_json::to_string_pretty(&metrics.snapshot())?);
    Ok(())
}
