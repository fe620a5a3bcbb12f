// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `engram serve`: run the background workers until interrupted.

use std::sync::Arc;

use engram_config::EngramConfig;
use engram_core::traits::TaskQueueAdapter;
use engram_core::EngramError;
use engram_memory::Workers;
use engram_storage::{Database, SqliteTaskQueue};
use tracing::info;

pub async fn run(config: &EngramConfig) -> Result<(), EngramError> {
    let db = Database::open(&config.storage.database_path).await?;
    let provider = crate::maintain::build_provider(config);
    let queue: Arc<dyn TaskQueueAdapter> = Arc::new(SqliteTaskQueue::new(db.clone()));

    let workers = Arc::new(Workers::new(db.clone(), config.clone(), provider, Some(queue)));
    let handles = workers.spawn_all();
    info!(workers = handles.len(), "engram workers running, ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| EngramError::Internal(format!("signal handler failed: {e}")))?;
    info!("shutting down");

    for handle in handles {
        handle.abort();
    }
    db.close().await
}
