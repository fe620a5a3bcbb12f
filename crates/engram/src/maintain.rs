// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `engram maintain`: one maintenance pass over the store.

use std::sync::Arc;

use engram_config::EngramConfig;
use engram_core::traits::{ProviderAdapter, TaskQueueAdapter};
use engram_core::EngramError;
use engram_memory::Workers;
use engram_storage::{Database, SqliteTaskQueue};
use tracing::warn;

/// Build the optional model provider: configured key (or env) enables the
/// model-based strategies, otherwise everything degrades to rules.
pub fn build_provider(config: &EngramConfig) -> Option<Arc<dyn ProviderAdapter>> {
    match engram_anthropic::AnthropicProvider::new(config) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(e) => {
            warn!("model provider unavailable, rule-based strategies only: {e}");
            None
        }
    }
}

pub async fn run(config: &EngramConfig) -> Result<(), EngramError> {
    let db = Database::open(&config.storage.database_path).await?;
    let provider = build_provider(config);
    let queue: Arc<dyn TaskQueueAdapter> = Arc::new(SqliteTaskQueue::new(db.clone()));

    let workers = Workers::new(db.clone(), config.clone(), provider, Some(queue));
    let summary = workers.run_maintenance_once().await?;

    println!(
        "maintenance complete: {} post-process jobs, {} arbitrations, {} scores recomputed, \
         {} expired, {} trimmed, {} semantic conflicts, {} promotions",
        summary.post_process_jobs,
        summary.arbitration_jobs,
        summary.scores_recomputed,
        summary.retention.expired_by_age,
        summary.retention.trimmed_by_count,
        summary.semantic_conflicts,
        summary.promotions,
    );

    db.close().await
}
