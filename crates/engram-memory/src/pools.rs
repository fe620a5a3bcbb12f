// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered memory pools: private → domain → global routing under a token
//! budget, and validation-gated promotion to the global pool.

use std::sync::Arc;

use engram_core::traits::EmbeddingAdapter;
use engram_core::types::{EmbeddingInput, MemoryEntry, PoolType};
use engram_core::EngramError;
use engram_config::model::{MemoryConfig, PoolConfig};
use engram_storage::models::EmbeddingFilter;
use engram_storage::{queries, Database};
use tracing::{debug, info};

use crate::vector::VectorStore;

/// Caller-supplied overrides for one pool retrieval.
#[derive(Debug, Clone, Default)]
pub struct PoolRetrievalOptions {
    /// Total token budget; defaults to the configured `max_tokens`.
    pub max_tokens: Option<usize>,
    /// Per-pool result cap; defaults to the configured `per_pool_limit`.
    pub per_pool_limit: Option<usize>,
}

/// One memory returned by a pool retrieval.
#[derive(Debug, Clone)]
pub struct PooledMemory {
    pub entry: MemoryEntry,
    pub similarity: f32,
    /// Which layer the memory came from.
    pub pool: PoolType,
    pub estimated_tokens: usize,
}

/// Result of a layered pool retrieval.
#[derive(Debug, Clone)]
pub struct PoolRetrievalResult {
    pub memories: Vec<PooledMemory>,
    pub total_tokens: usize,
    /// True when the token budget cut retrieval short.
    pub truncated: bool,
    /// Layers queried, in priority order.
    pub pools_searched: Vec<PoolType>,
}

/// Rough token estimate at ~4 characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4).max(1)
}

/// Routes retrieval through the three pool layers in priority order.
pub struct PoolRouter {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingAdapter>,
    db: Database,
    pool_config: PoolConfig,
    memory_config: MemoryConfig,
}

impl PoolRouter {
    pub fn new(
        db: Database,
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingAdapter>,
        pool_config: PoolConfig,
        memory_config: MemoryConfig,
    ) -> Self {
        Self {
            vector_store,
            embedder,
            db,
            pool_config,
            memory_config,
        }
    }

    /// Retrieve for an agent across private → domain → global pools,
    /// accumulating results until the token budget or pool caps are hit.
    pub async fn retrieve(
        &self,
        org_id: &str,
        agent_id: &str,
        department: Option<&str>,
        query: &str,
        options: &PoolRetrievalOptions,
    ) -> Result<PoolRetrievalResult, EngramError> {
        let budget = options.max_tokens.unwrap_or(self.pool_config.max_tokens);
        let per_pool = options
            .per_pool_limit
            .unwrap_or(self.pool_config.per_pool_limit);

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

        let mut memories: Vec<PooledMemory> = Vec::new();
        let mut total_tokens = 0usize;
        let mut truncated = false;
        let mut pools_searched = Vec::new();

        'pools: for pool in [PoolType::Private, PoolType::Domain, PoolType::Global] {
            let filter = match pool {
                PoolType::Private => EmbeddingFilter {
                    org_id: Some(org_id.to_string()),
                    pool_type: Some(PoolType::Private),
                    agent_id: Some(agent_id.to_string()),
                    ..EmbeddingFilter::default()
                },
                PoolType::Domain => {
                    let Some(department) = department else {
                        continue;
                    };
                    EmbeddingFilter {
                        org_id: Some(org_id.to_string()),
                        pool_type: Some(PoolType::Domain),
                        department: Some(department.to_string()),
                        ..EmbeddingFilter::default()
                    }
                }
                PoolType::Global => EmbeddingFilter {
                    org_id: Some(org_id.to_string()),
                    pool_type: Some(PoolType::Global),
                    ..EmbeddingFilter::default()
                },
            };
            pools_searched.push(pool);

            let hits = self.vector_store.search(&query_embedding, per_pool, &filter).await?;
            let ids: Vec<String> = hits
                .iter()
                .filter(|h| h.similarity as f64 >= self.memory_config.similarity_threshold)
                .map(|h| h.entry_id.clone())
                .collect();
            let entries = queries::entries::get_entries_by_ids(&self.db, &ids).await?;
            let mut entry_of: std::collections::HashMap<String, MemoryEntry> =
                entries.into_iter().map(|e| (e.id.clone(), e)).collect();

            for hit in hits {
                let Some(entry) = entry_of.remove(&hit.entry_id) else {
                    continue;
                };
                let tokens = estimate_tokens(&entry.content);
                if total_tokens + tokens > budget {
                    truncated = true;
                    break 'pools;
                }
                total_tokens += tokens;
                memories.push(PooledMemory {
                    entry,
                    similarity: hit.similarity,
                    pool,
                    estimated_tokens: tokens,
                });
            }
        }

        debug!(
            org_id,
            agent_id,
            results = memories.len(),
            total_tokens,
            truncated,
            "pool retrieval"
        );
        Ok(PoolRetrievalResult {
            memories,
            total_tokens,
            truncated,
            pools_searched,
        })
    }

    /// Per-pool (count, average final score) for an organization.
    pub async fn pool_stats(
        &self,
        org_id: &str,
    ) -> Result<Vec<(PoolType, i64, f64)>, EngramError> {
        queries::entries::pool_stats(&self.db, org_id).await
    }
}

/// Promotes well-validated domain memories to the global pool.
pub struct PoolPromoter {
    db: Database,
    config: PoolConfig,
}

impl PoolPromoter {
    pub fn new(db: Database, config: PoolConfig) -> Self {
        Self { db, config }
    }

    /// Promote every domain entry meeting BOTH gates: validation count at
    /// or above the (possibly per-department) threshold AND cached final
    /// score at or above the minimum. Returns the number promoted.
    /// Idempotent: promoted entries leave the domain pool.
    pub async fn promote_eligible(&self) -> Result<usize, EngramError> {
        let candidates = queries::entries::domain_promotion_candidates(&self.db).await?;
        let mut promoted = 0;

        for (entry, final_score) in candidates {
            let threshold = entry
                .department
                .as_deref()
                .and_then(|d| self.config.validation_overrides.get(d))
                .copied()
                .unwrap_or(self.config.promotion_validation_threshold);

            if entry.validation_count >= threshold && final_score >= self.config.promotion_min_score
            {
                queries::entries::update_pool(&self.db, &entry.id, PoolType::Global).await?;
                promoted += 1;
                info!(
                    id = entry.id,
                    validations = entry.validation_count,
                    final_score,
                    "promoted to global pool"
                );
            }
        }

        if promoted > 0 {
            metrics::counter!("engram_promotions").increment(promoted as u64);
        }
        Ok(promoted)
    }
}
