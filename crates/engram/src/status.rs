// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `engram status`: store statistics per organization.

use engram_config::EngramConfig;
use engram_core::types::ConflictStatus;
use engram_core::EngramError;
use engram_storage::{queries, Database};

pub async fn run(config: &EngramConfig) -> Result<(), EngramError> {
    let db = Database::open(&config.storage.database_path).await?;

    let org_ids = queries::orgs::list_org_ids(&db).await?;
    if org_ids.is_empty() {
        println!("no organizations registered");
    }

    for org_id in org_ids {
        let pools = queries::entries::pool_stats(&db, &org_id).await?;
        let total: i64 = pools.iter().map(|(_, count, _)| count).sum();
        let pending: i64 = queries::conflicts::conflict_stats(&db, &org_id)
            .await?
            .into_iter()
            .filter(|(status, _, _)| *status == ConflictStatus::Pending)
            .map(|(_, _, count)| count)
            .sum();

        println!("{org_id}: {total} live memories, {pending} pending conflicts");
        for (pool, count, avg_score) in pools {
            println!("  {:<8} {count:>6} entries, avg score {avg_score:.1}", pool.as_str());
        }
    }

    for queue_name in ["post_process", "arbitration"] {
        let (pending, processing, failed) = queries::queue::depth(&db, queue_name).await?;
        println!("queue {queue_name}: {pending} pending, {processing} processing, {failed} failed");
    }

    db.close().await
}
