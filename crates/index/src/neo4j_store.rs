use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use extract::{
    name_key, ClaimTriple, Entity, EntityDraft, EntityType,
    Mention, MentionEvidence, Modality, QualityFlag, Relation, RelationEvidence, ResolutionCandidate,
    ResolutionEvent, ResolutionMethod, ResolverRun, RiskProfile,
};
use ingest::{Document, Sentence, Span, SpanKind};
use neo4rs::{Graph, Query, Row};

use crate::capabilities::Capabilities;
use crate::store::{DocumentUnit, GraphStore, RelationWrite, StoreCounts, Upserted};

/// Labels whose `id` property carries a uniqueness constraint.
const ID_LABELS: &[&str] = &[
    "Document",
    "Span",
    "Entity",
    "Mention",
    "Relation",
    "RelationEvidence",
    "Claim",
    "ResolutionCandidate",
    "QualityFlag",
    "ResolverRun",
    "ResolutionEvent",
];

pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .with_context(|| format!("Failed to connect to Neo4j at {}", uri))?;
        Ok(Self::new(graph))
    }

    /// Create id constraints and lookup indexes. Safe to run repeatedly.
    pub async fn init_schema(&self) -> Result<()> {
        tracing::info!("Creating Neo4j constraints");

        for label in ID_LABELS {
            let query = Query::new(format!(
                "CREATE CONSTRAINT {}_id IF NOT EXISTS FOR (n:{}) REQUIRE n.id IS UNIQUE",
                label.to_lowercase(),
                label
            ));
            self.graph
                .run(query)
                .await
                .with_context(|| format!("Failed to create constraint on {}.id", label))?;
        }

        let indexes = [
            "CREATE INDEX entity_name_key IF NOT EXISTS FOR (e:Entity) ON (e.name_key)",
            "CREATE INDEX document_analyzed IF NOT EXISTS FOR (d:Document) ON (d.analyzed_at)",
            "CREATE INDEX mention_document IF NOT EXISTS FOR (m:Mention) ON (m.document_id)",
            "CREATE INDEX mention_entity IF NOT EXISTS FOR (m:Mention) ON (m.entity_id)",
            "CREATE INDEX sentence_document IF NOT EXISTS FOR (s:Sentence) ON (s.document_id)",
        ];
        for statement in indexes {
            self.graph
                .run(Query::new(statement.to_string()))
                .await
                .with_context(|| format!("Failed to run: {}", statement))?;
        }

        tracing::info!("Neo4j schema ready");
        Ok(())
    }

    async fn count(&self, cypher: &str) -> Result<usize> {
        let mut result = self
            .graph
            .execute(Query::new(cypher.to_string()))
            .await
            .with_context(|| format!("Failed to run count: {}", cypher))?;
        let count = if let Some(row) = result.next().await? {
            row.get::<i64>("count").unwrap_or(0) as usize
        } else {
            0
        };
        Ok(count)
    }

    async fn run_in_transaction(&self, queries: Vec<Query>, what: &str) -> Result<()> {
        if queries.is_empty() {
            return Ok(());
        }
        let mut txn = self
            .graph
            .start_txn()
            .await
            .with_context(|| format!("Failed to open transaction for {}", what))?;
        txn.run_queries(queries)
            .await
            .with_context(|| format!("Failed to write {}", what))?;
        txn.commit()
            .await
            .with_context(|| format!("Failed to commit {}", what))?;
        Ok(())
    }

    async fn existing_ids(&self, label: &str, ids: Vec<String>) -> Result<HashSet<String>> {
        let query = Query::new(format!(
            "MATCH (n:{}) WHERE n.id IN $ids RETURN n.id AS id",
            label
        ))
        .param("ids", ids);

        let mut result = self.graph.execute(query).await?;
        let mut found = HashSet::new();
        while let Some(row) = result.next().await? {
            found.insert(row.get::<String>("id").context("Missing id")?);
        }
        Ok(found)
    }

    async fn entities_where(&self, clause: &str, key: Option<String>) -> Result<Vec<Entity>> {
        let mut query = Query::new(format!(
            r#"
            MATCH (e:Entity) {}
            RETURN e.id AS id, e.full_name AS full_name, e.type AS type,
                   e.aliases AS aliases, e.risk AS risk
            ORDER BY e.id
            "#,
            clause
        ));
        if let Some(key) = key {
            query = query.param("key", key);
        }

        let mut result = self.graph.execute(query).await.context("Failed to load entities")?;
        let mut entities = Vec::new();
        while let Some(row) = result.next().await? {
            entities.push(entity_from_row(&row)?);
        }
        Ok(entities)
    }
}

fn entity_from_row(row: &Row) -> Result<Entity> {
    let risk: String = row.get("risk").unwrap_or_default();
    Ok(Entity {
        id: row.get("id").context("Missing entity id")?,
        full_name: row.get("full_name").context("Missing entity name")?,
        entity_type: EntityType::parse(&row.get::<String>("type").unwrap_or_default()),
        aliases: row.get::<Vec<String>>("aliases").unwrap_or_default().into_iter().collect(),
        risk: parse_risk(&risk),
    })
}

fn parse_risk(raw: &str) -> RiskProfile {
    if raw.is_empty() {
        return RiskProfile::default();
    }
    serde_json::from_str(raw).unwrap_or_default()
}

fn risk_json(risk: &RiskProfile) -> Result<String> {
    if risk.is_empty() {
        return Ok(String::new());
    }
    serde_json::to_string(risk).context("Failed to encode risk profile")
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn timestamp(row: &Row, key: &str) -> DateTime<Utc> {
    row.get::<String>(key)
        .ok()
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

fn span_query(span: &Span) -> Query {
    Query::new(
        r#"
        MATCH (d:Document {id: $document_id})
        MERGE (s:Span {id: $id})
        SET s.document_id = $document_id, s.kind = $kind, s.start_offset = $start_offset, s.end_offset = $end_offset,
            s.text = $text, s.cleaned_text = $cleaned_text, s.page_id = $page_id
        MERGE (d)-[:HAS_SPAN]->(s)
        "#
        .to_string(),
    )
    .param("id", span.id.clone())
    .param("document_id", span.document_id.clone())
    .param("kind", span.kind.as_str())
    .param("start_offset", span.start as i64)
    .param("end_offset", span.end as i64)
    .param("text", span.text.clone())
    .param("cleaned_text", span.cleaned_text.clone())
    .param("page_id", span.page_id.clone().unwrap_or_default())
}

fn mention_query(mention: &Mention) -> Result<Query> {
    let evidence = serde_json::to_string(&mention.evidence).context("Failed to encode mention evidence")?;
    Ok(Query::new(
        r#"
        MERGE (m:Mention {id: $id})
        SET m.document_id = $document_id, m.span_id = $span_id, m.entity_id = $entity_id,
            m.start_offset = $start_offset, m.end_offset = $end_offset, m.surface = $surface, m.normalized = $normalized,
            m.type = $type, m.method = $method, m.confidence = $confidence,
            m.context_before = $context_before, m.context_after = $context_after,
            m.sentence_id = $sentence_id, m.page_id = $page_id, m.evidence = $evidence
        WITH m
        MATCH (e:Entity {id: $entity_id})
        MERGE (m)-[:REFERS_TO]->(e)
        "#
        .to_string(),
    )
    .param("id", mention.id.clone())
    .param("document_id", mention.document_id.clone())
    .param("span_id", mention.span_id.clone())
    .param("entity_id", mention.entity_id.clone())
    .param("start_offset", mention.start as i64)
    .param("end_offset", mention.end as i64)
    .param("surface", mention.surface.clone())
    .param("normalized", mention.normalized.clone())
    .param("type", mention.entity_type.as_str())
    .param("method", mention.method.as_str())
    .param("confidence", mention.confidence)
    .param("context_before", mention.context_before.clone())
    .param("context_after", mention.context_after.clone())
    .param("sentence_id", mention.sentence_id.clone().unwrap_or_default())
    .param("page_id", mention.page_id.clone().unwrap_or_default())
    .param("evidence", evidence))
}

fn event_query(event: &ResolutionEvent) -> Result<Query> {
    let evidence = serde_json::to_string(&event.evidence).context("Failed to encode event evidence")?;
    Ok(Query::new(
        r#"
        MERGE (ev:ResolutionEvent {id: $id})
        ON CREATE SET ev.run_id = $run_id, ev.version = $version, ev.mention_id = $mention_id,
            ev.entity_id = $entity_id, ev.method = $method, ev.confidence = $confidence,
            ev.evidence = $evidence, ev.created_at = $created_at
        "#
        .to_string(),
    )
    .param("id", event.id.clone())
    .param("run_id", event.run_id.clone())
    .param("version", event.version.clone())
    .param("mention_id", event.mention_id.clone())
    .param("entity_id", event.entity_id.clone())
    .param("method", event.method.as_str())
    .param("confidence", event.confidence)
    .param("evidence", evidence)
    .param("created_at", event.created_at.to_rfc3339()))
}

fn candidate_query(candidate: &ResolutionCandidate) -> Result<Query> {
    let features = serde_json::to_string(&candidate.features).context("Failed to encode candidate features")?;
    Ok(Query::new(
        r#"
        MERGE (c:ResolutionCandidate {id: $id})
        ON CREATE SET c.kind = $kind, c.source_id = $source_id, c.candidate_entity_id = $candidate_entity_id,
            c.score = $score, c.features = $features, c.decision = $decision
        "#
        .to_string(),
    )
    .param("id", candidate.id.clone())
    .param("kind", candidate.kind.as_str())
    .param("source_id", candidate.source_id.clone())
    .param("candidate_entity_id", candidate.candidate_entity_id.clone())
    .param("score", candidate.score)
    .param("features", features)
    .param("decision", candidate.decision.map(|d| d.as_str()).unwrap_or_default()))
}

fn flag_query(flag: &QualityFlag) -> Query {
    Query::new(
        r#"
        MERGE (f:QualityFlag {id: $id})
        SET f.target_type = $target_type, f.target_id = $target_id, f.flag_type = $flag_type,
            f.severity = $severity, f.details = $details
        "#
        .to_string(),
    )
    .param("id", flag.id.clone())
    .param("target_type", flag.target_type.clone())
    .param("target_id", flag.target_id.clone())
    .param("flag_type", flag.flag_type.clone())
    .param("severity", flag.severity.as_str())
    .param("details", flag.details.to_string())
}

fn relation_query(relation: &Relation) -> Query {
    Query::new(
        r#"
        MERGE (r:Relation {id: $id})
        ON CREATE SET r.first_seen = $first_seen
        SET r.subject_id = $subject_id, r.object_id = $object_id, r.predicate = $predicate,
            r.weight = $weight, r.status = $status, r.last_seen = $last_seen
        WITH r
        MATCH (a:Entity {id: $subject_id}), (b:Entity {id: $object_id})
        MERGE (r)-[:SUBJECT]->(a)
        MERGE (r)-[:OBJECT]->(b)
        "#
        .to_string(),
    )
    .param("id", relation.id.clone())
    .param("subject_id", relation.subject_id.clone())
    .param("object_id", relation.object_id.clone())
    .param("predicate", relation.predicate.clone())
    .param("weight", relation.weight)
    .param("status", relation.status.clone())
    .param("first_seen", relation.first_seen.to_rfc3339())
    .param("last_seen", relation.last_seen.to_rfc3339())
}

fn evidence_query(evidence: &RelationEvidence) -> Query {
    Query::new(
        r#"
        MATCH (r:Relation {id: $relation_id})
        MERGE (ev:RelationEvidence {id: $id})
        SET ev.relation_id = $relation_id, ev.document_id = $document_id, ev.span_id = $span_id,
            ev.quote = $quote, ev.confidence = $confidence, ev.mention_ids = $mention_ids
        MERGE (r)-[:SUPPORTED_BY]->(ev)
        "#
        .to_string(),
    )
    .param("id", evidence.id.clone())
    .param("relation_id", evidence.relation_id.clone())
    .param("document_id", evidence.document_id.clone())
    .param("span_id", evidence.span_id.clone())
    .param("quote", evidence.quote.clone())
    .param("confidence", evidence.confidence)
    .param("mention_ids", evidence.mention_ids.clone())
}

fn claim_query(claim: &ClaimTriple) -> Query {
    Query::new(
        r#"
        CREATE (c:Claim {id: $id, subject_id: $subject_id, predicate: $predicate,
            object_id: $object_id, object_text: $object_text, document_id: $document_id,
            sentence_id: $sentence_id, confidence: $confidence, modality: $modality})
        "#
        .to_string(),
    )
    .param("id", claim.id.clone())
    .param("subject_id", claim.subject_id.clone())
    .param("predicate", claim.predicate.clone())
    .param("object_id", claim.object_id.clone().unwrap_or_default())
    .param("object_text", claim.object_text.clone().unwrap_or_default())
    .param("document_id", claim.document_id.clone())
    .param("sentence_id", claim.sentence_id.clone())
    .param("confidence", claim.confidence)
    .param("modality", claim.modality.as_str())
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn capabilities(&self) -> Result<Capabilities> {
        let mut labels: Vec<String> = Vec::new();

        let mut result = self
            .graph
            .execute(Query::new("CALL db.labels() YIELD label RETURN label".to_string()))
            .await
            .context("Failed to list labels")?;
        while let Some(row) = result.next().await? {
            if let Ok(label) = row.get::<String>("label") {
                labels.push(label);
            }
        }

        // pipeline-owned labels count once their constraint exists
        let mut result = self
            .graph
            .execute(Query::new(
                "SHOW CONSTRAINTS YIELD labelsOrTypes RETURN labelsOrTypes".to_string(),
            ))
            .await
            .context("Failed to list constraints")?;
        while let Some(row) = result.next().await? {
            labels.extend(row.get::<Vec<String>>("labelsOrTypes").unwrap_or_default());
        }

        Ok(Capabilities::from_labels(&labels))
    }

    async fn pending_documents(&self, limit: usize) -> Result<Vec<Document>> {
        let query = Query::new(
            r#"
            MATCH (d:Document)
            WHERE d.analyzed_at IS NULL
            RETURN d.id AS id, d.path AS path, d.content AS content
            ORDER BY d.id
            LIMIT $limit
            "#
            .to_string(),
        )
        .param("limit", limit as i64);

        let mut result = self
            .graph
            .execute(query)
            .await
            .context("Failed to fetch pending documents")?;
        let mut documents = Vec::new();
        while let Some(row) = result.next().await? {
            let id: String = row.get("id").context("Missing document id")?;
            let path: String = row.get("path").unwrap_or_default();
            let content: String = row.get("content").unwrap_or_default();
            documents.push(Document::new(id, path, content));
        }
        Ok(documents)
    }

    async fn sentences_for(&self, document_id: &str) -> Result<Vec<Sentence>> {
        let query = Query::new(
            r#"
            MATCH (s:Sentence {document_id: $document_id})
            RETURN s.id AS id, s.text AS text, s.page_id AS page_id,
                   coalesce(s.is_boilerplate, false) AS is_boilerplate,
                   s.ocr_quality_score AS ocr_quality_score, s.text_source AS text_source
            ORDER BY coalesce(s.position, 0), s.id
            "#
            .to_string(),
        )
        .param("document_id", document_id.to_string());

        let mut result = self.graph.execute(query).await.context("Failed to fetch sentences")?;
        let mut sentences = Vec::new();
        while let Some(row) = result.next().await? {
            let id: String = row.get("id").context("Missing sentence id")?;
            let text: String = row.get("text").unwrap_or_default();
            let mut sentence = Sentence::new(id, document_id, text);
            sentence.page_id = row.get::<String>("page_id").ok();
            sentence.is_boilerplate = row.get("is_boilerplate").unwrap_or(false);
            sentence.ocr_quality_score = row.get::<f64>("ocr_quality_score").ok();
            sentence.text_source = row.get::<String>("text_source").ok();
            sentences.push(sentence);
        }
        Ok(sentences)
    }

    async fn load_entities(&self) -> Result<Vec<Entity>> {
        self.entities_where("", None).await
    }

    async fn upsert_entity_by_name(&self, draft: &EntityDraft) -> Result<Upserted> {
        let key = name_key(&draft.full_name);
        if key.is_empty() {
            anyhow::bail!("Refusing to upsert an entity with an empty name");
        }
        let proposed = uuid::Uuid::new_v4().to_string();

        // MERGE on the name key; the returned id tells us who won
        let query = Query::new(
            r#"
            MERGE (e:Entity {name_key: $key})
            ON CREATE SET e.id = $id, e.full_name = $full_name, e.type = $type,
                          e.aliases = $aliases, e.risk = $risk
            ON MATCH SET e.aliases = coalesce(e.aliases, []) +
                              [a IN $aliases WHERE NOT a IN coalesce(e.aliases, [])],
                         e.risk = CASE WHEN coalesce(e.risk, '') = '' THEN $risk ELSE e.risk END
            RETURN e.id AS id
            "#
            .to_string(),
        )
        .param("key", key)
        .param("id", proposed.clone())
        .param("full_name", draft.full_name.clone())
        .param("type", draft.entity_type.as_str())
        .param("aliases", draft.aliases.iter().cloned().collect::<Vec<_>>())
        .param("risk", risk_json(&draft.risk)?);

        let mut result = self
            .graph
            .execute(query)
            .await
            .with_context(|| format!("Failed to upsert entity {}", draft.full_name))?;
        let Some(row) = result.next().await? else {
            anyhow::bail!("Entity upsert for {} returned no row", draft.full_name);
        };
        let id: String = row.get("id").context("Missing entity id")?;
        let created = id == proposed;
        Ok(Upserted { id, created })
    }

    async fn find_entity_by_name(&self, name: &str) -> Result<Option<Entity>> {
        let found = self
            .entities_where("WHERE e.name_key = $key", Some(name_key(name)))
            .await?;
        Ok(found.into_iter().next())
    }

    async fn commit_document(&self, unit: DocumentUnit) -> Result<()> {
        let mut queries = Vec::new();

        queries.extend(unit.spans.iter().map(span_query));
        for mention in &unit.mentions {
            queries.push(mention_query(mention)?);
        }
        for event in &unit.events {
            queries.push(event_query(event)?);
        }
        for candidate in &unit.candidates {
            queries.push(candidate_query(candidate)?);
        }
        queries.extend(unit.flags.iter().map(flag_query));

        queries.push(
            Query::new(
                r#"
                MATCH (d:Document {id: $id})
                SET d.analyzed_at = $analyzed_at, d.status = $status,
                    d.quarantine_reason = $reason
                "#
                .to_string(),
            )
            .param("id", unit.document_id.clone())
            .param("analyzed_at", unit.analyzed_at.to_rfc3339())
            .param("status", unit.outcome.status())
            .param("reason", unit.outcome.reason().unwrap_or_default().to_string()),
        );

        self.run_in_transaction(queries, &format!("document {}", unit.document_id))
            .await
    }

    async fn record_run(&self, run: &ResolverRun) -> Result<()> {
        let query = Query::new(
            r#"
            MERGE (r:ResolverRun {id: $id})
            SET r.version = $version, r.started_at = $started_at,
                r.finished_at = $finished_at, r.documents_processed = $documents
            "#
            .to_string(),
        )
        .param("id", run.id.clone())
        .param("version", run.version.clone())
        .param("started_at", run.started_at.to_rfc3339())
        .param("finished_at", run.finished_at.map(|t| t.to_rfc3339()).unwrap_or_default())
        .param("documents", run.documents_processed as i64);

        self.graph.run(query).await.context("Failed to record resolver run")?;
        Ok(())
    }

    async fn documents_with_mentions(&self) -> Result<Vec<String>> {
        let query = Query::new(
            "MATCH (m:Mention) RETURN DISTINCT m.document_id AS id ORDER BY id".to_string(),
        );
        let mut result = self.graph.execute(query).await?;
        let mut ids = Vec::new();
        while let Some(row) = result.next().await? {
            ids.push(row.get::<String>("id").context("Missing document id")?);
        }
        Ok(ids)
    }

    async fn mentions_for_document(&self, document_id: &str) -> Result<Vec<Mention>> {
        let query = Query::new(
            r#"
            MATCH (m:Mention {document_id: $document_id})
            RETURN m.id AS id, m.span_id AS span_id, m.entity_id AS entity_id,
                   m.start_offset AS start_offset, m.end_offset AS end_offset, m.surface AS surface,
                   m.normalized AS normalized, m.type AS type, m.method AS method,
                   m.confidence AS confidence, m.context_before AS context_before,
                   m.context_after AS context_after, m.sentence_id AS sentence_id,
                   m.page_id AS page_id, m.evidence AS evidence
            ORDER BY m.span_id, m.start_offset
            "#
            .to_string(),
        )
        .param("document_id", document_id.to_string());

        let mut result = self.graph.execute(query).await.context("Failed to fetch mentions")?;
        let mut mentions = Vec::new();
        while let Some(row) = result.next().await? {
            let entity_type = EntityType::parse(&row.get::<String>("type").unwrap_or_default());
            let surface: String = row.get("surface").unwrap_or_default();
            let normalized: String = row.get("normalized").unwrap_or_default();
            let evidence_raw: String = row.get("evidence").unwrap_or_default();
            let evidence = serde_json::from_str::<MentionEvidence>(&evidence_raw).unwrap_or_else(|_| {
                MentionEvidence {
                    context: String::new(),
                    surface: surface.clone(),
                    normalized: normalized.clone(),
                    entity_type,
                    score: 0.0,
                }
            });

            mentions.push(Mention {
                id: row.get("id").context("Missing mention id")?,
                document_id: document_id.to_string(),
                span_id: row.get("span_id").unwrap_or_default(),
                entity_id: row.get("entity_id").context("Missing mention entity")?,
                start: row.get::<i64>("start_offset").unwrap_or(0) as usize,
                end: row.get::<i64>("end_offset").unwrap_or(0) as usize,
                surface,
                normalized,
                entity_type,
                method: ResolutionMethod::parse(&row.get::<String>("method").unwrap_or_default()),
                confidence: row.get("confidence").unwrap_or(0.0),
                context_before: row.get("context_before").unwrap_or_default(),
                context_after: row.get("context_after").unwrap_or_default(),
                sentence_id: row.get::<String>("sentence_id").ok().and_then(non_empty),
                page_id: row.get::<String>("page_id").ok().and_then(non_empty),
                evidence,
            });
        }
        Ok(mentions)
    }

    async fn spans_for_document(&self, document_id: &str) -> Result<Vec<Span>> {
        let query = Query::new(
            r#"
            MATCH (s:Span {document_id: $document_id})
            RETURN s.id AS id, s.kind AS kind, s.start_offset AS start_offset, s.end_offset AS end_offset,
                   s.text AS text, s.cleaned_text AS cleaned_text, s.page_id AS page_id
            ORDER BY s.start_offset, s.id
            "#
            .to_string(),
        )
        .param("document_id", document_id.to_string());

        let mut result = self.graph.execute(query).await.context("Failed to fetch spans")?;
        let mut spans = Vec::new();
        while let Some(row) = result.next().await? {
            spans.push(Span {
                id: row.get("id").context("Missing span id")?,
                document_id: document_id.to_string(),
                kind: SpanKind::parse(&row.get::<String>("kind").unwrap_or_default()),
                start: row.get::<i64>("start_offset").unwrap_or(0) as usize,
                end: row.get::<i64>("end_offset").unwrap_or(0) as usize,
                text: row.get("text").unwrap_or_default(),
                cleaned_text: row.get("cleaned_text").unwrap_or_default(),
                page_id: row.get::<String>("page_id").ok().and_then(non_empty),
            });
        }
        Ok(spans)
    }

    async fn replace_relations(
        &self,
        relations: &[Relation],
        evidence: &[RelationEvidence],
    ) -> Result<RelationWrite> {
        let keep: Vec<String> = relations.iter().map(|r| r.id.clone()).collect();

        let stale_query = Query::new(
            "MATCH (r:Relation) WHERE NOT r.id IN $ids RETURN count(r) AS count".to_string(),
        )
        .param("ids", keep.clone());
        let mut result = self.graph.execute(stale_query).await?;
        let pruned = match result.next().await? {
            Some(row) => row.get::<i64>("count").unwrap_or(0) as usize,
            None => 0,
        };

        let mut queries = vec![
            Query::new("MATCH (r:Relation) WHERE NOT r.id IN $ids DETACH DELETE r".to_string())
                .param("ids", keep),
            Query::new("MATCH (ev:RelationEvidence) DETACH DELETE ev".to_string()),
        ];
        queries.extend(relations.iter().map(relation_query));
        queries.extend(evidence.iter().map(evidence_query));

        self.run_in_transaction(queries, "relations").await?;
        Ok(RelationWrite {
            written: relations.len(),
            pruned,
        })
    }

    async fn relations(&self) -> Result<Vec<Relation>> {
        let query = Query::new(
            r#"
            MATCH (r:Relation)
            RETURN r.id AS id, r.subject_id AS subject_id, r.object_id AS object_id,
                   r.predicate AS predicate, r.weight AS weight, r.status AS status,
                   r.first_seen AS first_seen, r.last_seen AS last_seen
            ORDER BY r.id
            "#
            .to_string(),
        );
        let mut result = self.graph.execute(query).await.context("Failed to fetch relations")?;
        let mut relations = Vec::new();
        while let Some(row) = result.next().await? {
            relations.push(Relation {
                id: row.get("id").context("Missing relation id")?,
                subject_id: row.get("subject_id").context("Missing subject")?,
                object_id: row.get("object_id").context("Missing object")?,
                predicate: row.get("predicate").unwrap_or_default(),
                weight: row.get("weight").unwrap_or(0.0),
                status: row.get("status").unwrap_or_default(),
                first_seen: timestamp(&row, "first_seen"),
                last_seen: timestamp(&row, "last_seen"),
            });
        }
        Ok(relations)
    }

    async fn insert_claims(&self, claims: &[ClaimTriple]) -> Result<usize> {
        let ids = claims.iter().map(|c| c.id.clone()).collect();
        let existing = self.existing_ids("Claim", ids).await?;

        let mut seen = HashSet::new();
        let fresh: Vec<&ClaimTriple> = claims
            .iter()
            .filter(|c| !existing.contains(&c.id) && seen.insert(c.id.clone()))
            .collect();

        let queries = fresh.iter().map(|c| claim_query(c)).collect();
        self.run_in_transaction(queries, "claims").await?;
        Ok(fresh.len())
    }

    async fn claims(&self) -> Result<Vec<ClaimTriple>> {
        let query = Query::new(
            r#"
            MATCH (c:Claim)
            RETURN c.id AS id, c.subject_id AS subject_id, c.predicate AS predicate,
                   c.object_id AS object_id, c.object_text AS object_text,
                   c.document_id AS document_id, c.sentence_id AS sentence_id,
                   c.confidence AS confidence, c.modality AS modality
            ORDER BY c.id
            "#
            .to_string(),
        );
        let mut result = self.graph.execute(query).await.context("Failed to fetch claims")?;
        let mut claims = Vec::new();
        while let Some(row) = result.next().await? {
            claims.push(ClaimTriple {
                id: row.get("id").context("Missing claim id")?,
                subject_id: row.get("subject_id").context("Missing claim subject")?,
                predicate: row.get("predicate").unwrap_or_default(),
                object_id: row.get::<String>("object_id").ok().and_then(non_empty),
                object_text: row.get::<String>("object_text").ok().and_then(non_empty),
                document_id: row.get("document_id").unwrap_or_default(),
                sentence_id: row.get("sentence_id").unwrap_or_default(),
                confidence: row.get("confidence").unwrap_or(0.0),
                modality: Modality::parse(&row.get::<String>("modality").unwrap_or_default()),
            });
        }
        Ok(claims)
    }

    async fn update_claim_confidence(&self, updates: &[(String, f64)]) -> Result<()> {
        let queries = updates
            .iter()
            .map(|(id, confidence)| {
                Query::new("MATCH (c:Claim {id: $id}) SET c.confidence = $confidence".to_string())
                    .param("id", id.clone())
                    .param("confidence", *confidence)
            })
            .collect();
        self.run_in_transaction(queries, "claim confidence").await
    }

    async fn insert_candidates(&self, candidates: &[ResolutionCandidate]) -> Result<usize> {
        let ids = candidates.iter().map(|c| c.id.clone()).collect();
        let existing = self.existing_ids("ResolutionCandidate", ids).await?;
        let fresh: Vec<&ResolutionCandidate> =
            candidates.iter().filter(|c| !existing.contains(&c.id)).collect();

        let mut queries = Vec::new();
        for candidate in &fresh {
            queries.push(candidate_query(candidate)?);
        }
        self.run_in_transaction(queries, "resolution candidates").await?;
        Ok(fresh.len())
    }

    async fn delete_entity(&self, entity_id: &str) -> Result<usize> {
        let query = Query::new(
            "MATCH (m:Mention {entity_id: $id}) RETURN count(m) AS count".to_string(),
        )
        .param("id", entity_id.to_string());
        let mut result = self.graph.execute(query).await?;
        let removed = match result.next().await? {
            Some(row) => row.get::<i64>("count").unwrap_or(0) as usize,
            None => 0,
        };

        let id = entity_id.to_string();
        let queries = vec![
            Query::new("MATCH (m:Mention {entity_id: $id}) DETACH DELETE m".to_string())
                .param("id", id.clone()),
            Query::new(
                r#"
                MATCH (r:Relation) WHERE r.subject_id = $id OR r.object_id = $id
                OPTIONAL MATCH (r)-[:SUPPORTED_BY]->(ev:RelationEvidence)
                DETACH DELETE r, ev
                "#
                .to_string(),
            )
            .param("id", id.clone()),
            Query::new(
                "MATCH (c:Claim) WHERE c.subject_id = $id OR c.object_id = $id DETACH DELETE c"
                    .to_string(),
            )
            .param("id", id.clone()),
            Query::new("MATCH (e:Entity {id: $id}) DETACH DELETE e".to_string()).param("id", id),
        ];
        self.run_in_transaction(queries, &format!("deletion of entity {}", entity_id))
            .await?;
        Ok(removed)
    }

    async fn reassign_mentions(&self, from_entity: &str, to_entity: &str) -> Result<usize> {
        let query = Query::new(
            r#"
            MATCH (target:Entity {id: $to})
            MATCH (m:Mention {entity_id: $from})
            OPTIONAL MATCH (m)-[old:REFERS_TO]->()
            DELETE old
            SET m.entity_id = $to
            MERGE (m)-[:REFERS_TO]->(target)
            RETURN count(DISTINCT m) AS count
            "#
            .to_string(),
        )
        .param("from", from_entity.to_string())
        .param("to", to_entity.to_string());

        let mut result = self
            .graph
            .execute(query)
            .await
            .with_context(|| format!("Failed to move mentions {} -> {}", from_entity, to_entity))?;
        let moved = match result.next().await? {
            Some(row) => row.get::<i64>("count").unwrap_or(0) as usize,
            None => 0,
        };
        Ok(moved)
    }

    async fn add_alias(&self, entity_id: &str, alias: &str) -> Result<()> {
        let query = Query::new(
            r#"
            MATCH (e:Entity {id: $id})
            SET e.aliases = CASE WHEN $alias IN coalesce(e.aliases, []) THEN e.aliases
                                 ELSE coalesce(e.aliases, []) + $alias END
            "#
            .to_string(),
        )
        .param("id", entity_id.to_string())
        .param("alias", alias.to_string());

        self.graph.run(query).await.context("Failed to add alias")?;
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            documents: self.count("MATCH (n:Document) RETURN count(n) AS count").await?,
            pending_documents: self
                .count("MATCH (n:Document) WHERE n.analyzed_at IS NULL RETURN count(n) AS count")
                .await?,
            quarantined_documents: self
                .count("MATCH (n:Document {status: 'quarantined'}) RETURN count(n) AS count")
                .await?,
            entities: self.count("MATCH (n:Entity) RETURN count(n) AS count").await?,
            mentions: self.count("MATCH (n:Mention) RETURN count(n) AS count").await?,
            relations: self.count("MATCH (n:Relation) RETURN count(n) AS count").await?,
            relation_evidence: self.count("MATCH (n:RelationEvidence) RETURN count(n) AS count").await?,
            claims: self.count("MATCH (n:Claim) RETURN count(n) AS count").await?,
            resolution_candidates: self
                .count("MATCH (n:ResolutionCandidate) RETURN count(n) AS count")
                .await?,
            quality_flags: self.count("MATCH (n:QualityFlag) RETURN count(n) AS count").await?,
            resolution_events: self.count("MATCH (n:ResolutionEvent) RETURN count(n) AS count").await?,
            runs: self.count("MATCH (n:ResolverRun) RETURN count(n) AS count").await?,
        })
    }
}
