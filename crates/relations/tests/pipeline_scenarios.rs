use std::sync::Arc;

use extract::{CandidateDecision, EntityDraft, EntityType, Modality, ResolutionMethod, MENTIONED_WITH};
use index::{Capabilities, DocumentIndexer, GraphStore, MemoryStore, PipelineConfig, PipelineContext};
use ingest::Document;
use relations::{GraphPasses, PassReport};

const MEETING: &str = "Donald Trump met with Jeffrey Epstein at the mansion.";

async fn open(store: Arc<MemoryStore>, config: PipelineConfig) -> (PipelineContext, DocumentIndexer) {
    let ctx = PipelineContext::open(store, config).await.unwrap();
    let mut indexer = DocumentIndexer::builtin(ctx.config.context_radius).unwrap();
    indexer.prepare(&ctx).await.unwrap();
    (ctx, indexer)
}

async fn run_pipeline(store: Arc<MemoryStore>) -> PassReport {
    let (ctx, mut indexer) = open(store, PipelineConfig::default()).await;
    indexer.run_batches(&ctx, None).await.unwrap();
    GraphPasses::from_context(&ctx).unwrap().run(&ctx).await.unwrap()
}

#[tokio::test]
async fn test_meeting_sentence_yields_claim_and_relation() {
    let store = Arc::new(MemoryStore::new());
    store.add_document(Document::new("doc-1", "a.txt", MEETING)).unwrap();

    let report = run_pipeline(store.clone()).await;
    assert_eq!(report.relations.relations, 1);

    let mentions = store.mentions().unwrap();
    assert_eq!(mentions.len(), 2);
    assert!(mentions.iter().all(|m| m.entity_type == EntityType::Person));

    let claims = store.claims().await.unwrap();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].predicate, "contacted");
    assert_eq!(claims[0].modality, Modality::Asserted);
    assert!((claims[0].confidence - 0.7).abs() < 1e-9);

    let trump = store.find_entity_by_name("Donald Trump").await.unwrap().unwrap();
    assert_eq!(claims[0].subject_id, trump.id);

    let relations = store.relations().await.unwrap();
    assert_eq!(relations.len(), 1);
    assert_eq!(relations[0].predicate, MENTIONED_WITH);
    assert_eq!(relations[0].weight, 1.0);
    assert_eq!(store.evidence().unwrap().len(), 1);
}

#[tokio::test]
async fn test_three_documents_corroborate_claim() {
    let store = Arc::new(MemoryStore::new());
    for i in 1..=3 {
        store
            .add_document(Document::new(format!("doc-{}", i), format!("{}.txt", i), MEETING))
            .unwrap();
    }

    let report = run_pipeline(store.clone()).await;
    assert_eq!(report.claims.as_ref().map(|c| c.corroborated), Some(3));

    let claims = store.claims().await.unwrap();
    assert_eq!(claims.len(), 3);
    assert!(claims.iter().all(|c| (c.confidence - 0.858_496).abs() < 1e-5));

    let relations = store.relations().await.unwrap();
    assert_eq!(relations.len(), 1);
    assert!((relations[0].weight - 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_rerunning_graph_passes_is_stable() {
    let store = Arc::new(MemoryStore::new());
    store.add_document(Document::new("doc-1", "a.txt", MEETING)).unwrap();
    store.add_document(Document::new("doc-2", "b.txt", MEETING)).unwrap();

    let (ctx, mut indexer) = open(store.clone(), PipelineConfig::default()).await;
    indexer.run_batches(&ctx, None).await.unwrap();
    let passes = GraphPasses::from_context(&ctx).unwrap();

    passes.run(&ctx).await.unwrap();
    let first_relations = store.relations().await.unwrap();
    let first_claims = store.claims().await.unwrap();

    let second = passes.run(&ctx).await.unwrap();
    assert_eq!(second.claims.map(|c| c.inserted), Some(0));
    assert_eq!(second.relations.pruned, 0);

    let relations = store.relations().await.unwrap();
    assert_eq!(relations.len(), first_relations.len());
    assert_eq!(relations[0].weight, first_relations[0].weight);
    assert_eq!(relations[0].first_seen, first_relations[0].first_seen);

    let claims = store.claims().await.unwrap();
    assert_eq!(claims, first_claims);
}

#[tokio::test]
async fn test_cleanup_removes_greeting_entity() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_document(Document::new(
            "doc-1",
            "a.txt",
            "Hi Jeffrey, please call Sarah Kellen about the schedule.",
        ))
        .unwrap();

    let (ctx, mut indexer) = open(store.clone(), PipelineConfig::default()).await;
    indexer.run_batches(&ctx, None).await.unwrap();

    let greeting = store.find_entity_by_name("Hi Jeffrey").await.unwrap().unwrap();
    assert!(store.mentions().unwrap().iter().any(|m| m.entity_id == greeting.id));

    let report = GraphPasses::from_context(&ctx).unwrap().run(&ctx).await.unwrap();
    assert_eq!(report.consolidation.junk_deleted, 1);
    assert_eq!(report.consolidation.junk_mentions_deleted, 1);

    assert!(store.find_entity_by_name("Hi Jeffrey").await.unwrap().is_none());
    assert!(store.mentions().unwrap().iter().all(|m| m.entity_id != greeting.id));
    assert!(store.find_entity_by_name("Sarah Kellen").await.unwrap().is_some());
}

#[tokio::test]
async fn test_ocr_variant_folds_into_canonical() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_document(Document::new("doc-1", "a.txt", "Jeffrey Epsteln flew to Paris."))
        .unwrap();
    store
        .add_document(Document::new("doc-2", "b.txt", "Jeffrey Epstein owned the island."))
        .unwrap();

    let report = run_pipeline(store.clone()).await;
    assert_eq!(report.consolidation.variants_merged, 1);
    assert_eq!(report.consolidation.mentions_reassigned, 1);

    assert!(store.find_entity_by_name("Jeffrey Epsteln").await.unwrap().is_none());
    let canonical = store.find_entity_by_name("Jeffrey Epstein").await.unwrap().unwrap();
    assert!(canonical.aliases.contains("Jeffrey Epsteln"));

    let moved = store
        .mentions()
        .unwrap()
        .into_iter()
        .filter(|m| m.surface == "Jeffrey Epsteln")
        .all(|m| m.entity_id == canonical.id);
    assert!(moved);
}

#[tokio::test]
async fn test_quarantined_document_is_marked_processed() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_document(Document::new(
            "doc-1",
            "a.txt",
            "Ghislaine Maxwell's file lists SSN 123-45-6789 next to Sarah Kellen.",
        ))
        .unwrap();

    let report = run_pipeline(store.clone()).await;
    assert_eq!(report.relations.relations, 0);

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.mentions, 0);
    assert_eq!(counts.entities, 0);
    assert_eq!(counts.claims, 0);
    assert_eq!(counts.pending_documents, 0);

    let status = store.document_status("doc-1").unwrap().unwrap();
    assert_eq!(status.status, "quarantined");
    assert_eq!(status.quarantine_reason.as_deref(), Some("social_security_number"));
    assert!(store.document("doc-1").unwrap().unwrap().analyzed_at.is_some());
}

#[tokio::test]
async fn test_vip_alias_resolves_to_canonical() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_document(Document::new("doc-1", "a.txt", "Jeff Epstein hosted the dinner."))
        .unwrap();

    run_pipeline(store.clone()).await;

    let mentions = store.mentions().unwrap();
    assert_eq!(mentions.len(), 1);
    assert_eq!(mentions[0].method, ResolutionMethod::VipRule);
    assert_eq!(mentions[0].confidence, 1.0);

    let epstein = store.find_entity_by_name("Jeffrey Epstein").await.unwrap().unwrap();
    assert_eq!(mentions[0].entity_id, epstein.id);
    assert_eq!(epstein.risk.red_flag_rating, Some(5));
}

#[tokio::test]
async fn test_short_candidates_create_nothing() {
    let store = Arc::new(MemoryStore::new());
    store
        .add_document(Document::new("doc-1", "a.txt", "Jo saw Al. Sarah Kellen booked it."))
        .unwrap();

    run_pipeline(store.clone()).await;

    let entities = store.load_entities().await.unwrap();
    assert!(entities.iter().all(|e| e.full_name.chars().count() >= 3));
    assert!(store.mentions().unwrap().iter().all(|m| m.normalized.chars().count() >= 3));
}

#[tokio::test]
async fn test_failed_unit_leaves_document_pending_until_retry() {
    let store = Arc::new(MemoryStore::new());
    store.add_document(Document::new("doc-1", "a.txt", MEETING)).unwrap();
    store.inject_commit_failure("doc-1").unwrap();

    let (ctx, mut indexer) = open(store.clone(), PipelineConfig::default()).await;
    assert!(indexer.run_batches(&ctx, None).await.is_err());

    assert!(store.document("doc-1").unwrap().unwrap().analyzed_at.is_none());
    assert!(store.mentions().unwrap().is_empty());
    assert!(store.events().unwrap().is_empty());

    let stats = indexer.run_batches(&ctx, None).await.unwrap();
    assert_eq!(stats.documents, 1);
    assert_eq!(stats.entities_created, 0);

    let counts = store.counts().await.unwrap();
    assert_eq!(counts.mentions, 2);
    assert_eq!(counts.entities, 2);
    assert_eq!(counts.pending_documents, 0);
}

#[tokio::test]
async fn test_claim_pass_skipped_without_claim_store() {
    let caps = Capabilities {
        claims: false,
        ..Capabilities::all()
    };
    let store = Arc::new(MemoryStore::with_capabilities(caps));
    store.add_document(Document::new("doc-1", "a.txt", MEETING)).unwrap();

    let report = run_pipeline(store.clone()).await;
    assert!(report.claims.is_none());
    assert_eq!(report.relations.relations, 1);
    assert!(store.claims().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reviewed_candidate_keeps_decision_across_reruns() {
    let store = Arc::new(MemoryStore::new());
    for name in ["Palm Beach Police", "Palm Beach Police Department"] {
        store
            .upsert_entity_by_name(&EntityDraft::new(name, EntityType::Organization))
            .await
            .unwrap();
    }

    let (ctx, _) = open(store.clone(), PipelineConfig::default()).await;
    let passes = GraphPasses::from_context(&ctx).unwrap();
    let first = passes.run(&ctx).await.unwrap();
    assert_eq!(first.consolidation.candidates, 1);

    // a reviewer accepts the pair out of band
    let pair_id = store.candidates().unwrap()[0].id.clone();
    assert!(store.set_candidate_decision(&pair_id, CandidateDecision::Merged).unwrap());

    let second = passes.run(&ctx).await.unwrap();
    assert_eq!(second.consolidation.candidates, 0);

    let stored = store.candidates().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].decision, Some(CandidateDecision::Merged));
}
