// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pluggable vector similarity search.
//!
//! The trait makes no assumption about the backing engine beyond "can
//! search vectors by cosine similarity". The reference implementation
//! scans embeddings stored as BLOBs on the entry rows and computes
//! similarity in-process, which is exact and fast enough for
//! per-organization working sets; swap in an index-backed store behind
//! the same trait when scale demands it.

use async_trait::async_trait;

use engram_core::types::{cosine_similarity, HealthStatus};
use engram_core::EngramError;
use engram_storage::models::EmbeddingFilter;
use engram_storage::{queries, Database};

/// One similarity hit, sorted descending by the caller contract.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub entry_id: String,
    /// Cosine similarity in [0, 1].
    pub similarity: f32,
}

/// Similarity search over entry embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Attach (or replace) the vector for an entry.
    async fn insert(&self, entry_id: &str, vector: &[f32]) -> Result<(), EngramError>;

    /// Attach vectors for many entries.
    async fn batch_insert(&self, items: &[(String, Vec<f32>)]) -> Result<(), EngramError>;

    /// Top-`limit` matches for `query`, restricted to live rows matching
    /// `filter`, sorted by similarity descending.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: &EmbeddingFilter,
    ) -> Result<Vec<VectorMatch>, EngramError>;

    /// Remove an entry's vector.
    async fn delete(&self, entry_id: &str) -> Result<(), EngramError>;

    /// Replace the metadata document attached to an entry.
    async fn update_metadata(
        &self,
        entry_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), EngramError>;

    async fn health_check(&self) -> Result<HealthStatus, EngramError>;
}

/// Reference store: BLOB embeddings on entry rows, exact cosine scan.
#[derive(Clone)]
pub struct SqliteVectorStore {
    db: Database,
}

impl SqliteVectorStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert(&self, entry_id: &str, vector: &[f32]) -> Result<(), EngramError> {
        queries::entries::set_embedding(&self.db, entry_id, Some(vector)).await
    }

    async fn batch_insert(&self, items: &[(String, Vec<f32>)]) -> Result<(), EngramError> {
        for (entry_id, vector) in items {
            queries::entries::set_embedding(&self.db, entry_id, Some(vector)).await?;
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: &EmbeddingFilter,
    ) -> Result<Vec<VectorMatch>, EngramError> {
        let rows = queries::entries::latest_embeddings(&self.db, filter).await?;

        let mut matches: Vec<VectorMatch> = rows
            .into_iter()
            .filter(|(_, embedding)| embedding.len() == query.len())
            .map(|(entry_id, embedding)| VectorMatch {
                entry_id,
                similarity: cosine_similarity(query, &embedding),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn delete(&self, entry_id: &str) -> Result<(), EngramError> {
        queries::entries::set_embedding(&self.db, entry_id, None).await
    }

    async fn update_metadata(
        &self,
        entry_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), EngramError> {
        queries::entries::update_metadata(&self.db, entry_id, metadata).await
    }

    async fn health_check(&self) -> Result<HealthStatus, EngramError> {
        let probe = EmbeddingFilter {
            org_id: Some(String::new()),
            ..EmbeddingFilter::default()
        };
        match queries::entries::latest_embeddings(&self.db, &probe).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}
