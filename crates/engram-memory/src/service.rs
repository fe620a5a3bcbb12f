// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory service facade: every operation the store exposes.
//!
//! Write path: validate namespace → access check → quota pre-check →
//! embedding → transactional insert (quota increment + claim-conflict
//! scan) → initial score → async post-processing enqueue. The caller gets
//! an id as soon as the score is cached; entity extraction and relation
//! building happen downstream and never affect the committed row.

use std::sync::Arc;

use engram_core::traits::{EmbeddingAdapter, ProviderAdapter, TaskQueueAdapter};
use engram_core::types::{
    now_iso, AccessOp, ConflictStatus, ConflictType, ContentType, EmbeddingInput, JobOptions,
    MemoryEntry, MemoryType, PolicyType, PoolType, QualityTier,
};
use engram_core::{validate_namespace, EngramError};
use engram_config::EngramConfig;
use engram_storage::models::EmbeddingFilter;
use engram_storage::{queries, Database};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::conflicts::{ConflictResolver, ResolutionOutcome, ResolutionStrategy};
use crate::governance::{GovernanceService, RetentionReport};
use crate::pools::{PoolRetrievalOptions, PoolRetrievalResult, PoolRouter};
use crate::retriever::{HybridRetriever, RetrievalOptions, RetrievalResult};
use crate::scoring::{combined_score, ScoringEngine};
use crate::vector::{SqliteVectorStore, VectorStore};
use crate::versions::{VersionDiff, VersionManager, VersionNode, VersionPatch};
use crate::workers::{PostProcessJob, POST_PROCESS_QUEUE};

/// Everything needed to create a memory.
#[derive(Debug, Clone)]
pub struct CreateMemoryRequest {
    pub org_id: String,
    pub namespace: String,
    pub content: String,
    pub content_type: ContentType,
    pub metadata: serde_json::Value,
    pub confidence: f64,
    pub reputation: f64,
    pub memory_type: Option<MemoryType>,
    pub pool_type: PoolType,
    pub department: Option<String>,
    pub agent_id: Option<String>,
    pub claim_key: Option<String>,
    pub claim_value: Option<String>,
}

impl CreateMemoryRequest {
    /// A plain fact in the global pool with neutral signals.
    pub fn new(org_id: &str, namespace: &str, content: &str) -> Self {
        Self {
            org_id: org_id.to_string(),
            namespace: namespace.to_string(),
            content: content.to_string(),
            content_type: ContentType::Fact,
            metadata: serde_json::json!({}),
            confidence: 0.5,
            reputation: 50.0,
            memory_type: None,
            pool_type: PoolType::Global,
            department: None,
            agent_id: None,
            claim_key: None,
            claim_value: None,
        }
    }
}

/// Result of a create: the committed entry plus any claim conflicts the
/// write triggered.
#[derive(Debug, Clone)]
pub struct CreatedMemory {
    pub entry: MemoryEntry,
    pub conflict_ids: Vec<String>,
}

/// Options for a plain ranked query.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub namespace: Option<String>,
    pub agent_filter: Option<String>,
    pub min_confidence: f64,
    pub limit: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            agent_filter: None,
            min_confidence: 0.0,
            limit: 10,
        }
    }
}

/// One ranked query hit.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub similarity: f32,
    pub combined_score: f64,
    pub tier: QualityTier,
}

/// Store-wide counters for one organization.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total_entries: i64,
    pub by_pool: Vec<(PoolType, i64, f64)>,
    pub pending_conflicts: i64,
}

/// The Relational Memory Core service.
pub struct MemoryService {
    db: Database,
    config: EngramConfig,
    embedder: Arc<dyn EmbeddingAdapter>,
    queue: Option<Arc<dyn TaskQueueAdapter>>,
    scoring: ScoringEngine,
    governance: Arc<GovernanceService>,
    retriever: HybridRetriever,
    router: PoolRouter,
    resolver: ConflictResolver,
    versions: VersionManager,
}

impl MemoryService {
    pub fn new(
        db: Database,
        config: EngramConfig,
        embedder: Arc<dyn EmbeddingAdapter>,
        provider: Option<Arc<dyn ProviderAdapter>>,
        queue: Option<Arc<dyn TaskQueueAdapter>>,
    ) -> Self {
        let scoring = ScoringEngine::new(&config.scoring);
        let vector_store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::new(db.clone()));
        let governance = Arc::new(GovernanceService::new(db.clone(), &config.governance));
        let retriever = HybridRetriever::new(
            db.clone(),
            vector_store.clone(),
            embedder.clone(),
            scoring.clone(),
            config.memory.clone(),
        );
        let router = PoolRouter::new(
            db.clone(),
            vector_store.clone(),
            embedder.clone(),
            config.pools.clone(),
            config.memory.clone(),
        );
        let resolver = ConflictResolver::new(
            db.clone(),
            provider.clone(),
            queue.clone(),
            scoring.clone(),
            config.anthropic.default_model.clone(),
            config.anthropic.max_tokens,
            config.conflicts.clone(),
        );
        let versions = VersionManager::new(db.clone());

        Self {
            db,
            config,
            embedder,
            queue,
            scoring,
            governance,
            retriever,
            router,
            resolver,
            versions,
        }
    }

    /// The governance surface (policies, retention, access).
    pub fn governance(&self) -> &GovernanceService {
        &self.governance
    }

    // --- Write path ---

    /// Create a memory. Synchronous through the initial score; relation
    /// building and entity extraction run asynchronously afterwards.
    pub async fn create(&self, request: CreateMemoryRequest) -> Result<CreatedMemory, EngramError> {
        validate_namespace(&request.namespace)?;
        self.governance
            .check_access(
                &request.org_id,
                &request.namespace,
                request.agent_id.as_deref(),
                AccessOp::Create,
            )
            .await?;

        // Advisory quota check before the (possibly expensive) embedding
        // call; the insert transaction re-checks authoritatively.
        let quota = queries::orgs::quota(&self.db, &request.org_id).await?;
        if quota.used >= quota.max {
            return Err(EngramError::QuotaExceeded {
                org_id: request.org_id,
                max: quota.max,
                used: quota.used,
            });
        }

        let embedding = self.embed_content(&request.content, request.content_type).await?;

        let decay_factor = request
            .memory_type
            .map(|m| m.decay_factor())
            .unwrap_or_else(|| request.content_type.default_decay_factor());

        let now = now_iso();
        let id = Uuid::now_v7().to_string();
        let entry = MemoryEntry {
            id: id.clone(),
            org_id: request.org_id,
            namespace: request.namespace,
            content_type: request.content_type,
            content: request.content,
            embedding,
            metadata: request.metadata,
            confidence: request.confidence.clamp(0.0, 1.0),
            reputation: request.reputation.clamp(0.0, 100.0),
            usage_count: 0,
            validation_count: 0,
            version: 1,
            parent_id: None,
            root_id: id,
            is_latest: true,
            memory_type: request.memory_type,
            pool_type: request.pool_type,
            department: request.department,
            agent_id: request.agent_id,
            claim_key: request.claim_key,
            claim_value: request.claim_value,
            archived: false,
            created_at: now.clone(),
            updated_at: now.clone(),
            accessed_at: now.clone(),
            expires_at: None,
            decay_factor,
            decay_checkpoint: now,
        };

        let conflict_ids = queries::entries::insert_entry_with_quota(&self.db, &entry).await?;
        let score = self.scoring.score(&entry);
        queries::scores::upsert_score(&self.db, &entry.id, score).await?;

        self.enqueue_post_processing(&entry.id).await;

        metrics::counter!("engram_memories_created").increment(1);
        if !conflict_ids.is_empty() {
            metrics::counter!("engram_conflicts_detected").increment(conflict_ids.len() as u64);
            debug!(id = entry.id, conflicts = conflict_ids.len(), "write triggered claim conflicts");
        }

        Ok(CreatedMemory { entry, conflict_ids })
    }

    /// Create a new version of an existing memory.
    pub async fn update(
        &self,
        id: &str,
        patch: VersionPatch,
        author: &str,
    ) -> Result<CreatedMemory, EngramError> {
        let parent = self.must_get(id).await?;
        self.governance
            .check_access(&parent.org_id, &parent.namespace, Some(author), AccessOp::Update)
            .await?;

        // Re-embed only when the content actually changed.
        let embedding = if patch.changes_content(&parent) {
            self.embed_content(patch.content.as_deref().unwrap_or(""), parent.content_type)
                .await?
        } else {
            None
        };

        let (entry, conflict_ids) =
            self.versions.create_version(id, patch, author, embedding).await?;

        let score = self.scoring.score(&entry);
        queries::scores::upsert_score(&self.db, &entry.id, score).await?;
        self.enqueue_post_processing(&entry.id).await;

        Ok(CreatedMemory { entry, conflict_ids })
    }

    /// Soft delete: the entry expires and leaves retrieval, history stays.
    pub async fn delete(&self, id: &str, agent_id: Option<&str>) -> Result<(), EngramError> {
        let entry = self.must_get(id).await?;
        self.governance
            .check_access(&entry.org_id, &entry.namespace, agent_id, AccessOp::Delete)
            .await?;
        queries::entries::soft_delete(&self.db, id).await
    }

    /// Hard archive: destructive, cascading removal of the whole version
    /// chain. The only irreversible operation.
    pub async fn archive(&self, id: &str, agent_id: Option<&str>) -> Result<usize, EngramError> {
        let entry = self.must_get(id).await?;
        self.governance
            .check_access(&entry.org_id, &entry.namespace, agent_id, AccessOp::Archive)
            .await?;
        queries::entries::delete_chain(&self.db, &entry.root_id).await
    }

    /// Record an external validation of a memory and refresh its score.
    pub async fn validate(&self, id: &str) -> Result<(), EngramError> {
        queries::entries::record_validation(&self.db, id).await?;
        let entry = self.must_get(id).await?;
        let score = self.scoring.score(&entry);
        queries::scores::upsert_score(&self.db, id, score).await
    }

    // --- Read path ---

    pub async fn get(&self, id: &str) -> Result<Option<MemoryEntry>, EngramError> {
        queries::entries::get_entry(&self.db, id).await
    }

    pub async fn list_by_namespace(
        &self,
        org_id: &str,
        namespace: &str,
        limit: usize,
    ) -> Result<Vec<MemoryEntry>, EngramError> {
        validate_namespace(namespace)?;
        queries::entries::list_by_namespace(&self.db, org_id, namespace, limit).await
    }

    /// Ranked similarity query (no graph expansion).
    pub async fn query(
        &self,
        org_id: &str,
        query: &str,
        options: &QueryOptions,
    ) -> Result<Vec<ScoredMemory>, EngramError> {
        let output = self
            .embedder
            .embed(EmbeddingInput {
                texts: vec![query.to_string()],
            })
            .await?;
        let query_embedding = output.embeddings.into_iter().next().ok_or_else(|| {
            EngramError::Embedding {
                message: "embedding returned no results".to_string(),
            }
        })?;

        let filter = EmbeddingFilter {
            org_id: Some(org_id.to_string()),
            namespace: options.namespace.clone(),
            agent_id: options.agent_filter.clone(),
            ..EmbeddingFilter::default()
        };
        let store = SqliteVectorStore::new(self.db.clone());
        let hits = store
            .search(
                &query_embedding,
                self.config.memory.max_retrieval_results,
                &filter,
            )
            .await?;
        let hits: Vec<_> = hits
            .into_iter()
            .filter(|h| h.similarity as f64 >= self.config.memory.similarity_threshold)
            .collect();

        let ids: Vec<String> = hits.iter().map(|h| h.entry_id.clone()).collect();
        let entries = queries::entries::get_entries_by_ids(&self.db, &ids).await?;
        let mut entry_of: std::collections::HashMap<String, MemoryEntry> =
            entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        let scores = queries::scores::get_scores_by_ids(&self.db, &ids).await?;

        let mut results = Vec::new();
        for hit in hits {
            let Some(entry) = entry_of.remove(&hit.entry_id) else {
                continue;
            };
            if entry.confidence < options.min_confidence {
                continue;
            }
            let final_score = scores
                .get(&entry.id)
                .map(|s| s.final_score)
                .unwrap_or_else(|| self.scoring.score(&entry).final_score);
            let combined = combined_score(hit.similarity as f64, final_score);
            results.push(ScoredMemory {
                tier: QualityTier::for_score(combined * 100.0),
                entry,
                similarity: hit.similarity,
                combined_score: combined,
            });
        }
        results.sort_by(|a, b| {
            b.combined_score
                .partial_cmp(&a.combined_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(options.limit);

        self.touch_in_background(results.iter().map(|r| r.entry.id.clone()).collect());
        metrics::counter!("engram_queries").increment(1);
        Ok(results)
    }

    /// Hybrid retrieval: direct matches, graph context, inference paths.
    pub async fn retrieve(
        &self,
        org_id: &str,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<RetrievalResult, EngramError> {
        let result = self.retriever.retrieve(org_id, query, options).await?;
        self.touch_in_background(
            result.direct_matches.iter().map(|m| m.entry.id.clone()).collect(),
        );
        Ok(result)
    }

    /// Record accesses and refresh scores without blocking the request
    /// that triggered them.
    fn touch_in_background(&self, ids: Vec<String>) {
        if ids.is_empty() {
            return;
        }
        let db = self.db.clone();
        let scoring = self.scoring.clone();
        tokio::spawn(async move {
            if let Err(e) = queries::entries::bump_access(&db, &ids).await {
                warn!("access bump failed: {e}");
                return;
            }
            for id in &ids {
                match queries::entries::get_entry(&db, id).await {
                    Ok(Some(entry)) => {
                        let score = scoring.score(&entry);
                        if let Err(e) = queries::scores::upsert_score(&db, id, score).await {
                            warn!(id, "score refresh failed: {e}");
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(id, "score refresh load failed: {e}"),
                }
            }
        });
    }

    // --- Versions ---

    pub async fn version_tree(&self, id: &str) -> Result<VersionNode, EngramError> {
        self.versions.version_tree(id).await
    }

    pub async fn history(&self, id: &str) -> Result<Vec<MemoryEntry>, EngramError> {
        self.versions.history(id).await
    }

    pub async fn rollback(&self, id: &str, target_version: i64) -> Result<MemoryEntry, EngramError> {
        self.versions.rollback(id, target_version).await
    }

    pub async fn diff(&self, a: &str, b: &str) -> Result<VersionDiff, EngramError> {
        self.versions.compare_versions(a, b).await
    }

    pub async fn archive_old_versions(&self, id: &str, keep: usize) -> Result<usize, EngramError> {
        self.versions.archive_old_versions(id, keep).await
    }

    // --- Conflicts ---

    pub async fn conflicts(
        &self,
        org_id: &str,
        status: Option<ConflictStatus>,
        limit: usize,
    ) -> Result<Vec<engram_core::types::MemoryConflict>, EngramError> {
        queries::conflicts::list_conflicts(&self.db, org_id, status, limit).await
    }

    pub async fn conflict_stats(
        &self,
        org_id: &str,
    ) -> Result<Vec<(ConflictStatus, ConflictType, i64)>, EngramError> {
        queries::conflicts::conflict_stats(&self.db, org_id).await
    }

    /// Resolve a conflict with the strategy configured for its namespace
    /// (score-wins when no policy exists).
    pub async fn resolve_conflict(&self, conflict_id: &str) -> Result<ResolutionOutcome, EngramError> {
        let conflict = queries::conflicts::get_conflict(&self.db, conflict_id)
            .await?
            .ok_or_else(|| EngramError::NotFound {
                kind: "conflict",
                id: conflict_id.to_string(),
            })?;

        // The namespace of either side selects the policy; both sides of
        // a claim mismatch share one by construction.
        let namespace = match queries::entries::get_entry(&self.db, &conflict.first_id).await? {
            Some(entry) => entry.namespace,
            None => conflict.org_id.clone(),
        };
        let strategy = self
            .governance
            .resolution_strategy(&conflict.org_id, &namespace)
            .await?;
        self.resolver.resolve(conflict_id, strategy).await
    }

    /// Resolve a conflict with an explicit strategy.
    pub async fn resolve_conflict_with(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
    ) -> Result<ResolutionOutcome, EngramError> {
        self.resolver.resolve(conflict_id, strategy).await
    }

    pub async fn ignore_conflict(&self, conflict_id: &str) -> Result<(), EngramError> {
        self.resolver.ignore(conflict_id).await
    }

    // --- Pools ---

    pub async fn pool_retrieve(
        &self,
        org_id: &str,
        agent_id: &str,
        department: Option<&str>,
        query: &str,
        options: &PoolRetrievalOptions,
    ) -> Result<PoolRetrievalResult, EngramError> {
        let result = self
            .router
            .retrieve(org_id, agent_id, department, query, options)
            .await?;
        self.touch_in_background(result.memories.iter().map(|m| m.entry.id.clone()).collect());
        Ok(result)
    }

    pub async fn pool_stats(&self, org_id: &str) -> Result<Vec<(PoolType, i64, f64)>, EngramError> {
        self.router.pool_stats(org_id).await
    }

    // --- Governance passthroughs ---

    pub async fn check_access(
        &self,
        org_id: &str,
        namespace: &str,
        agent_id: Option<&str>,
        op: AccessOp,
    ) -> Result<(), EngramError> {
        self.governance.check_access(org_id, namespace, agent_id, op).await
    }

    pub async fn enforce_retention(&self, org_id: &str) -> Result<RetentionReport, EngramError> {
        self.governance.enforce_retention(org_id).await
    }

    pub async fn set_policy(
        &self,
        org_id: &str,
        namespace: &str,
        policy_type: PolicyType,
        rules: &serde_json::Value,
    ) -> Result<String, EngramError> {
        validate_namespace(namespace)?;
        self.governance.set_policy(org_id, namespace, policy_type, rules).await
    }

    pub async fn remove_policy(
        &self,
        org_id: &str,
        namespace: &str,
        policy_type: PolicyType,
    ) -> Result<bool, EngramError> {
        self.governance.remove_policy(org_id, namespace, policy_type).await
    }

    // --- Stats ---

    pub async fn stats(&self, org_id: &str) -> Result<StoreStats, EngramError> {
        let by_pool = queries::entries::pool_stats(&self.db, org_id).await?;
        let total_entries = by_pool.iter().map(|(_, count, _)| count).sum();
        let pending_conflicts = queries::conflicts::conflict_stats(&self.db, org_id)
            .await?
            .into_iter()
            .filter(|(status, _, _)| *status == ConflictStatus::Pending)
            .map(|(_, _, count)| count)
            .sum();
        Ok(StoreStats {
            total_entries,
            by_pool,
            pending_conflicts,
        })
    }

    // --- Internals ---

    async fn must_get(&self, id: &str) -> Result<MemoryEntry, EngramError> {
        self.get(id).await?.ok_or_else(|| EngramError::NotFound {
            kind: "memory",
            id: id.to_string(),
        })
    }

    /// Embed content, failing the write for content types that require a
    /// vector and skipping quietly for those that do not.
    async fn embed_content(
        &self,
        content: &str,
        content_type: ContentType,
    ) -> Result<Option<Vec<f32>>, EngramError> {
        if !content_type.requires_embedding() {
            return Ok(None);
        }
        let output = self
            .embedder
            .embed(EmbeddingInput {
                texts: vec![content.to_string()],
            })
            .await
            .map_err(|e| EngramError::Embedding {
                message: format!("embedding failed for {} content: {e}", content_type.as_str()),
            })?;
        let embedding = output.embeddings.into_iter().next().ok_or_else(|| {
            EngramError::Embedding {
                message: "embedding returned no results".to_string(),
            }
        })?;
        Ok(Some(embedding))
    }

    /// Hand the committed id to the background pipeline. Failures degrade
    /// to a warning; the write has already succeeded.
    async fn enqueue_post_processing(&self, memory_id: &str) {
        let Some(queue) = &self.queue else {
            warn!(memory_id, "no task queue configured, skipping post-processing");
            return;
        };
        let payload = match serde_json::to_string(&PostProcessJob {
            memory_id: memory_id.to_string(),
        }) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(memory_id, "post-process payload serialization failed: {e}");
                return;
            }
        };
        if let Err(e) = queue
            .enqueue(POST_PROCESS_QUEUE, &payload, JobOptions::default())
            .await
        {
            warn!(memory_id, "post-process enqueue failed: {e}");
        }
    }
}
