// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relation building: candidate discovery + typed-edge inference.
//!
//! Runs asynchronously after every committed write. Candidates come from
//! three independent strategies (vector similarity, entity co-occurrence,
//! temporal proximity), deduplicated by id; each candidate pair is judged
//! by a model reasoner with a rule fallback, and edges above the
//! confidence threshold are persisted. Errors are logged and swallowed —
//! this path never affects the committed entry.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::DateTime;
use engram_core::traits::ProviderAdapter;
use engram_core::types::{
    cosine_similarity, InferredBy, MemoryEntry, ProviderMessage, ProviderRequest, RelationType,
};
use engram_core::EngramError;
use engram_config::model::MemoryConfig;
use engram_storage::models::EmbeddingFilter;
use engram_storage::{queries, Database};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::extractor::Extraction;
use crate::vector::VectorStore;

/// Prompt for model-based relation inference between two memories.
const RELATION_PROMPT: &str = r#"Given two memories, decide how the FIRST relates to the SECOND.

FIRST: {first}

SECOND: {second}

Pick exactly one relation type:
CAUSES, CONTRADICTS, SUPPORTS, TEMPORAL_BEFORE, TEMPORAL_AFTER, DERIVED_FROM, PART_OF, SIMILAR_TO, IMPACTS, NONE

Return a single JSON object:
{"type": "<relation type>", "strength": <0.0-1.0>, "reason": "<one sentence>", "confidence": <0.0-1.0>}

Use NONE when no meaningful relation exists. Output the JSON only:"#;

/// One inferred candidate edge before persistence.
#[derive(Debug, Clone)]
struct InferredRelation {
    relation_type: RelationType,
    strength: f64,
    reason: String,
    confidence: f64,
    inferred_by: InferredBy,
}

#[derive(Debug, Deserialize)]
struct ModelRelation {
    #[serde(rename = "type")]
    relation_type: String,
    #[serde(default)]
    strength: f64,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    confidence: f64,
}

/// Discovers graph edges for newly written memories.
pub struct RelationBuilder {
    db: Database,
    vector_store: Arc<dyn VectorStore>,
    provider: Option<Arc<dyn ProviderAdapter>>,
    model: String,
    max_tokens: u32,
    config: MemoryConfig,
}

impl RelationBuilder {
    pub fn new(
        db: Database,
        vector_store: Arc<dyn VectorStore>,
        provider: Option<Arc<dyn ProviderAdapter>>,
        model: String,
        max_tokens: u32,
        config: MemoryConfig,
    ) -> Self {
        Self {
            db,
            vector_store,
            provider,
            model,
            max_tokens,
            config,
        }
    }

    /// Persist extracted entities and link them to the entry. Relation
    /// candidate discovery by co-occurrence depends on these links.
    pub async fn tag_entities(
        &self,
        entry: &MemoryEntry,
        extraction: &Extraction,
    ) -> Result<usize, EngramError> {
        let mut linked = 0;
        for entity in &extraction.entities {
            let entity_id = queries::entities::upsert_entity(
                &self.db,
                &entry.org_id,
                &entity.name.to_lowercase(),
                &entity.entity_type,
                entity.confidence,
            )
            .await?;
            queries::entities::link_entity(&self.db, &entry.id, entity_id).await?;
            linked += 1;
        }
        Ok(linked)
    }

    /// Build graph edges for a memory. Returns the number of edges
    /// persisted.
    pub async fn build_relations(&self, memory_id: &str) -> Result<usize, EngramError> {
        let entry = match queries::entries::get_entry(&self.db, memory_id).await? {
            Some(entry) => entry,
            None => {
                warn!(memory_id, "relation build skipped: entry vanished");
                return Ok(0);
            }
        };

        let candidates = self.collect_candidates(&entry).await?;
        if candidates.is_empty() {
            debug!(memory_id, "no relation candidates");
            return Ok(0);
        }

        let own_entities = self.entity_names(&entry.id).await?;
        let mut persisted = 0;

        for candidate in &candidates {
            let inferred = match self.infer(&entry, candidate, &own_entities).await {
                Ok(inferred) => inferred,
                Err(e) => {
                    warn!(memory_id, candidate = candidate.id, "relation inference failed: {e}");
                    continue;
                }
            };

            if let Some(relation) = inferred {
                if relation.confidence >= self.config.relation_confidence_threshold {
                    queries::relations::upsert_relation(
                        &self.db,
                        &entry.id,
                        &candidate.id,
                        relation.relation_type,
                        relation.strength.clamp(0.0, 1.0),
                        &relation.reason,
                        relation.inferred_by,
                    )
                    .await?;
                    persisted += 1;
                }
            }
        }

        metrics::counter!("engram_relations_built").increment(persisted as u64);
        debug!(memory_id, persisted, "relation build complete");
        Ok(persisted)
    }

    /// Union of the three candidate strategies, deduplicated, excluding
    /// the entry's own version chain.
    async fn collect_candidates(
        &self,
        entry: &MemoryEntry,
    ) -> Result<Vec<MemoryEntry>, EngramError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut ids: Vec<String> = Vec::new();

        if let Some(embedding) = &entry.embedding {
            let filter = EmbeddingFilter {
                org_id: Some(entry.org_id.clone()),
                ..EmbeddingFilter::default()
            };
            let matches = self
                .vector_store
                .search(embedding, self.config.relation_candidate_limit + 1, &filter)
                .await?;
            for hit in matches {
                if hit.entry_id != entry.id && seen.insert(hit.entry_id.clone()) {
                    ids.push(hit.entry_id);
                }
            }
        }

        let co_occurring = queries::entities::co_occurring_entries(
            &self.db,
            &entry.id,
            self.config.relation_candidate_limit,
        )
        .await?;
        for id in co_occurring {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }

        let neighbors = queries::entries::temporal_neighbors(
            &self.db,
            &entry.org_id,
            &entry.created_at,
            self.config.temporal_window_hours,
            &entry.root_id,
        )
        .await?;
        for neighbor in neighbors.into_iter().take(self.config.relation_candidate_limit) {
            if seen.insert(neighbor.id.clone()) {
                ids.push(neighbor.id);
            }
        }

        let mut candidates = queries::entries::get_entries_by_ids(&self.db, &ids).await?;
        candidates.retain(|c| c.root_id != entry.root_id);
        Ok(candidates)
    }

    async fn infer(
        &self,
        entry: &MemoryEntry,
        candidate: &MemoryEntry,
        own_entities: &HashSet<String>,
    ) -> Result<Option<InferredRelation>, EngramError> {
        if let Some(provider) = &self.provider {
            let request = ProviderRequest {
                model: self.model.clone(),
                system_prompt: None,
                messages: vec![ProviderMessage {
                    role: "user".to_string(),
                    content: RELATION_PROMPT
                        .replace("{first}", &entry.content)
                        .replace("{second}", &candidate.content),
                }],
                max_tokens: self.max_tokens,
            };
            match provider.complete(request).await {
                Ok(response) => {
                    if let Some(parsed) = parse_relation_response(&response.content) {
                        return Ok(parsed);
                    }
                    warn!("model relation output unparseable, using rules");
                }
                Err(e) => warn!("model relation inference failed, using rules: {e}"),
            }
        }

        let candidate_entities = self.entity_names(&candidate.id).await?;
        Ok(rule_infer(
            entry,
            candidate,
            own_entities,
            &candidate_entities,
            self.config.temporal_window_hours,
        ))
    }

    async fn entity_names(&self, entry_id: &str) -> Result<HashSet<String>, EngramError> {
        Ok(queries::entities::entities_for_entry(&self.db, entry_id)
            .await?
            .into_iter()
            .map(|tag| tag.name)
            .collect())
    }
}

/// Parse the model's relation judgment. `NONE` and unknown types map to
/// no relation.
fn parse_relation_response(response: &str) -> Option<Option<InferredRelation>> {
    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')? + 1;
    let parsed: ModelRelation = serde_json::from_str(&trimmed[start..end]).ok()?;

    if parsed.relation_type.eq_ignore_ascii_case("NONE") {
        return Some(None);
    }
    let relation_type = RelationType::from_str_value(parsed.relation_type.as_str())?;
    Some(Some(InferredRelation {
        relation_type,
        strength: parsed.strength.clamp(0.0, 1.0),
        reason: parsed.reason,
        confidence: parsed.confidence.clamp(0.0, 1.0),
        inferred_by: InferredBy::Model,
    }))
}

/// Deterministic fallback inference.
///
/// In order: creation within the temporal window yields a temporal edge;
/// embedding similarity above 0.8 yields SIMILAR_TO; entity overlap above
/// 0.5 yields PART_OF; otherwise no relation.
fn rule_infer(
    entry: &MemoryEntry,
    candidate: &MemoryEntry,
    entry_entities: &HashSet<String>,
    candidate_entities: &HashSet<String>,
    temporal_window_hours: i64,
) -> Option<InferredRelation> {
    if let Some(hours_apart) = hours_between(&entry.created_at, &candidate.created_at) {
        if hours_apart.abs() <= temporal_window_hours as f64 && hours_apart != 0.0 {
            // Positive means the entry was created after the candidate.
            let relation_type = if hours_apart > 0.0 {
                RelationType::TemporalAfter
            } else {
                RelationType::TemporalBefore
            };
            return Some(InferredRelation {
                relation_type,
                strength: 0.6,
                reason: "created within the same time window".to_string(),
                confidence: 0.6,
                inferred_by: InferredBy::Rule,
            });
        }
    }

    if let (Some(a), Some(b)) = (&entry.embedding, &candidate.embedding) {
        if a.len() == b.len() {
            let similarity = cosine_similarity(a, b) as f64;
            if similarity > 0.8 {
                return Some(InferredRelation {
                    relation_type: RelationType::SimilarTo,
                    strength: similarity,
                    reason: format!("embedding similarity {similarity:.2}"),
                    confidence: 0.7,
                    inferred_by: InferredBy::Rule,
                });
            }
        }
    }

    let smaller = entry_entities.len().min(candidate_entities.len());
    if smaller > 0 {
        let shared = entry_entities.intersection(candidate_entities).count();
        let overlap = shared as f64 / smaller as f64;
        if overlap > 0.5 {
            return Some(InferredRelation {
                relation_type: RelationType::PartOf,
                strength: overlap,
                reason: format!("{shared} shared entities"),
                confidence: 0.65,
                inferred_by: InferredBy::Rule,
            });
        }
    }

    None
}

fn hours_between(a_iso: &str, b_iso: &str) -> Option<f64> {
    let a = DateTime::parse_from_rfc3339(a_iso).ok()?;
    let b = DateTime::parse_from_rfc3339(b_iso).ok()?;
    Some((a - b).num_seconds() as f64 / 3600.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_config::model::MemoryConfig;
    use engram_test_utils::harness::{make_entry, seeded_db};
    use engram_test_utils::MockProvider;

    use crate::vector::SqliteVectorStore;

    fn builder_with(
        db: Database,
        provider: Option<Arc<dyn ProviderAdapter>>,
    ) -> RelationBuilder {
        RelationBuilder::new(
            db.clone(),
            Arc::new(SqliteVectorStore::new(db)),
            provider,
            "test-model".to_string(),
            512,
            MemoryConfig::default(),
        )
    }

    async fn insert(db: &Database, entry: &MemoryEntry) {
        queries::entries::insert_entry_with_quota(db, entry).await.unwrap();
    }

    #[tokio::test]
    async fn similar_entries_get_rule_edges() {
        let db = seeded_db().await;

        let mut a = make_entry("a", "acme/eng");
        a.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        a.created_at = "2026-01-01T00:00:00.000Z".to_string();
        insert(&db, &a).await;

        let mut b = make_entry("b", "acme/eng");
        b.embedding = Some(vec![0.98, 0.17, 0.0, 0.0]);
        // Far outside the temporal window so the similarity rule fires.
        b.created_at = "2026-02-01T00:00:00.000Z".to_string();
        insert(&db, &b).await;

        let builder = builder_with(db.clone(), None);
        let count = builder.build_relations("b").await.unwrap();
        assert_eq!(count, 1);

        let edges = queries::relations::edges_from(&db, &["b".to_string()], None)
            .await
            .unwrap();
        assert_eq!(edges[0].relation_type, RelationType::SimilarTo);
        assert_eq!(edges[0].inferred_by, InferredBy::Rule);
        assert!(edges[0].strength > 0.8);
    }

    #[tokio::test]
    async fn temporal_neighbors_get_temporal_edges() {
        let db = seeded_db().await;

        let mut a = make_entry("a", "acme/eng");
        a.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        a.created_at = "2026-01-01T00:00:00.000Z".to_string();
        insert(&db, &a).await;

        // Orthogonal embedding, but created two hours later.
        let mut b = make_entry("b", "acme/eng");
        b.embedding = Some(vec![0.0, 1.0, 0.0, 0.0]);
        b.created_at = "2026-01-01T02:00:00.000Z".to_string();
        insert(&db, &b).await;

        let builder = builder_with(db.clone(), None);
        builder.build_relations("b").await.unwrap();

        let edges = queries::relations::edges_from(&db, &["b".to_string()], None)
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
        // b came after a.
        assert_eq!(edges[0].relation_type, RelationType::TemporalAfter);
    }

    #[tokio::test]
    async fn model_judgment_wins_when_configured() {
        let db = seeded_db().await;

        let mut a = make_entry("a", "acme/eng");
        a.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        insert(&db, &a).await;
        let mut b = make_entry("b", "acme/eng");
        b.embedding = Some(vec![0.9, 0.43, 0.0, 0.0]);
        insert(&db, &b).await;

        let provider = MockProvider::with_responses(vec![
            r#"{"type": "CAUSES", "strength": 0.85, "reason": "deploy broke the build", "confidence": 0.9}"#
                .to_string(),
        ]);
        let builder = builder_with(db.clone(), Some(Arc::new(provider)));
        let count = builder.build_relations("b").await.unwrap();
        assert_eq!(count, 1);

        let edges = queries::relations::edges_from(&db, &["b".to_string()], None)
            .await
            .unwrap();
        assert_eq!(edges[0].relation_type, RelationType::Causes);
        assert_eq!(edges[0].inferred_by, InferredBy::Model);
        assert_eq!(edges[0].reason, "deploy broke the build");
    }

    #[tokio::test]
    async fn low_confidence_model_judgment_not_persisted() {
        let db = seeded_db().await;

        let mut a = make_entry("a", "acme/eng");
        a.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        insert(&db, &a).await;
        let mut b = make_entry("b", "acme/eng");
        b.embedding = Some(vec![0.9, 0.43, 0.0, 0.0]);
        insert(&db, &b).await;

        let provider = MockProvider::with_responses(vec![
            r#"{"type": "IMPACTS", "strength": 0.4, "reason": "maybe", "confidence": 0.3}"#
                .to_string(),
        ]);
        let builder = builder_with(db.clone(), Some(Arc::new(provider)));
        let count = builder.build_relations("b").await.unwrap();
        assert_eq!(count, 0, "confidence below 0.6 must not persist");
    }

    #[tokio::test]
    async fn none_judgment_creates_nothing() {
        let db = seeded_db().await;

        let mut a = make_entry("a", "acme/eng");
        a.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        insert(&db, &a).await;
        let mut b = make_entry("b", "acme/eng");
        b.embedding = Some(vec![0.9, 0.43, 0.0, 0.0]);
        insert(&db, &b).await;

        let provider = MockProvider::with_responses(vec![
            r#"{"type": "NONE", "strength": 0, "reason": "", "confidence": 1.0}"#.to_string(),
        ]);
        let builder = builder_with(db.clone(), Some(Arc::new(provider)));
        assert_eq!(builder.build_relations("b").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn own_version_chain_is_never_a_candidate() {
        let db = seeded_db().await;

        let mut v1 = make_entry("m-1", "acme/eng");
        v1.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        insert(&db, &v1).await;

        let mut v2 = make_entry("m-1-v2", "acme/eng");
        v2.embedding = Some(vec![1.0, 0.0, 0.0, 0.0]);
        v2.parent_id = Some("m-1".to_string());
        v2.root_id = "m-1".to_string();
        v2.version = 2;
        queries::entries::insert_version(&db, &v2).await.unwrap();

        let builder = builder_with(db.clone(), None);
        assert_eq!(builder.build_relations("m-1-v2").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_entry_is_not_an_error() {
        let db = seeded_db().await;
        let builder = builder_with(db, None);
        assert_eq!(builder.build_relations("ghost").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn tag_entities_links_extraction() {
        let db = seeded_db().await;
        let entry = make_entry("m-1", "acme/eng");
        insert(&db, &entry).await;

        let extraction = crate::extractor::rule_extract("PostgreSQL replaced MySQL at Acme");
        let builder = builder_with(db.clone(), None);
        let linked = builder.tag_entities(&entry, &extraction).await.unwrap();
        assert!(linked >= 2);

        let tags = queries::entities::entities_for_entry(&db, "m-1").await.unwrap();
        assert!(tags.iter().any(|t| t.name == "postgresql"));
    }

    #[test]
    fn parse_relation_handles_none_and_unknown() {
        assert!(parse_relation_response(r#"{"type": "NONE"}"#).unwrap().is_none());
        assert!(parse_relation_response(r#"{"type": "FRIES_WITH"}"#).is_none());
        assert!(parse_relation_response("garbage").is_none());

        let ok = parse_relation_response(
            r#"{"type": "SUPPORTS", "strength": 1.7, "reason": "r", "confidence": 0.8}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(ok.relation_type, RelationType::Supports);
        assert_eq!(ok.strength, 1.0, "strength must clamp to 1.0");
    }
}
