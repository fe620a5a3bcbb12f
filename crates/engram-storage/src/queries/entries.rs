// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory entry CRUD, version-chain operations, and retention updates.
//!
//! The insert path couples three things in one transaction: the
//! organization quota increment, the entry row, and structural
//! claim-mismatch detection. Either all commit or none do.

use engram_core::types::{vec_to_blob, MemoryEntry, PoolType};
use engram_core::EngramError;
use rusqlite::{params, Transaction};

use crate::database::{map_tr_err, Database};
use crate::models::{entry_from_row, EmbeddingFilter, ENTRY_COLUMNS};

/// Insert a brand-new entry, incrementing the org quota and scanning for
/// claim mismatches in the same transaction.
///
/// Returns the ids of any `claim_mismatch` conflicts created.
pub async fn insert_entry_with_quota(
    db: &Database,
    entry: &MemoryEntry,
) -> Result<Vec<String>, EngramError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            // Quota guard: the WHERE clause makes increment + ceiling check atomic.
            let updated = tx.execute(
                "UPDATE organizations
                 SET quota_used = quota_used + 1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND quota_used < quota_max",
                params![entry.org_id],
            )?;
            if updated == 0 {
                let counts = tx.query_row(
                    "SELECT quota_max, quota_used FROM organizations WHERE id = ?1",
                    params![entry.org_id],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                );
                let err = match counts {
                    Ok((max, used)) => EngramError::QuotaExceeded {
                        org_id: entry.org_id.clone(),
                        max,
                        used,
                    },
                    Err(rusqlite::Error::QueryReturnedNoRows) => EngramError::NotFound {
                        kind: "organization",
                        id: entry.org_id.clone(),
                    },
                    Err(e) => return Err(e.into()),
                };
                return Ok(Err(err));
            }

            insert_entry_row(&tx, &entry)?;
            let conflict_ids = detect_claim_conflicts(&tx, &entry)?;

            tx.commit()?;
            Ok(Ok(conflict_ids))
        })
        .await
        .map_err(map_tr_err)?
}

/// Insert a new version row, demoting the parent from `is_latest` in the
/// same transaction. The parent must currently be the latest row of its
/// chain. New versions also run claim-mismatch detection.
pub async fn insert_version(
    db: &Database,
    new_entry: &MemoryEntry,
) -> Result<Vec<String>, EngramError> {
    let entry = new_entry.clone();
    let parent_id = match entry.parent_id.clone() {
        Some(id) => id,
        None => {
            return Err(EngramError::Internal(
                "version insert requires a parent_id".to_string(),
            ))
        }
    };

    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let demoted = tx.execute(
                "UPDATE memory_entries
                 SET is_latest = 0, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND is_latest = 1",
                params![parent_id],
            )?;
            if demoted == 0 {
                return Ok(Err(EngramError::NotFound {
                    kind: "latest version",
                    id: parent_id.clone(),
                }));
            }

            insert_entry_row(&tx, &entry)?;
            let conflict_ids = detect_claim_conflicts(&tx, &entry)?;

            tx.commit()?;
            Ok(Ok(conflict_ids))
        })
        .await
        .map_err(map_tr_err)?
}

/// Raw row insert shared by the create and version paths.
fn insert_entry_row(tx: &Transaction, entry: &MemoryEntry) -> Result<(), rusqlite::Error> {
    let embedding_blob = entry.embedding.as_ref().map(|v| vec_to_blob(v));
    let metadata = serde_json::to_string(&entry.metadata).unwrap_or_else(|_| "{}".to_string());
    tx.execute(
        "INSERT INTO memory_entries (id, org_id, namespace, content_type, content, embedding,
            metadata, confidence, reputation, usage_count, validation_count, version,
            parent_id, root_id, is_latest, memory_type, pool_type, department, agent_id,
            claim_key, claim_value, archived, created_at, updated_at, accessed_at,
            expires_at, decay_factor, decay_checkpoint)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                 ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
        params![
            entry.id,
            entry.org_id,
            entry.namespace,
            entry.content_type.as_str(),
            entry.content,
            embedding_blob,
            metadata,
            entry.confidence,
            entry.reputation,
            entry.usage_count,
            entry.validation_count,
            entry.version,
            entry.parent_id,
            entry.root_id,
            entry.is_latest as i64,
            entry.memory_type.map(|m| m.as_str()),
            entry.pool_type.as_str(),
            entry.department,
            entry.agent_id,
            entry.claim_key,
            entry.claim_value,
            entry.archived as i64,
            entry.created_at,
            entry.updated_at,
            entry.accessed_at,
            entry.expires_at,
            entry.decay_factor,
            entry.decay_checkpoint,
        ],
    )?;
    Ok(())
}

/// Scan for latest entries in the same namespace asserting the same claim
/// key with a different value, and record a pending conflict for each pair
/// not already linked by one.
fn detect_claim_conflicts(
    tx: &Transaction,
    entry: &MemoryEntry,
) -> Result<Vec<String>, rusqlite::Error> {
    let (claim_key, claim_value) = match (&entry.claim_key, &entry.claim_value) {
        (Some(k), Some(v)) => (k, v),
        _ => return Ok(Vec::new()),
    };

    let clashing: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT m.id FROM memory_entries m
             WHERE m.org_id = ?1 AND m.namespace = ?2 AND m.claim_key = ?3
               AND m.claim_value IS NOT NULL AND m.claim_value != ?4
               AND m.is_latest = 1 AND m.archived = 0
               AND m.root_id != ?5
               AND NOT EXISTS (
                   SELECT 1 FROM memory_conflicts c
                   WHERE (c.first_id = m.id AND c.second_id = ?6)
                      OR (c.first_id = ?6 AND c.second_id = m.id))",
        )?;
        stmt.query_map(
            params![
                entry.org_id,
                entry.namespace,
                claim_key,
                claim_value,
                entry.root_id,
                entry.id
            ],
            |row| row.get(0),
        )?
        .collect::<Result<Vec<String>, _>>()?
    };

    let mut conflict_ids = Vec::with_capacity(clashing.len());
    for existing_id in clashing {
        let conflict_id = uuid::Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO memory_conflicts (id, org_id, first_id, second_id, conflict_type, status)
             VALUES (?1, ?2, ?3, ?4, 'claim_mismatch', 'pending')",
            params![conflict_id, entry.org_id, existing_id, entry.id],
        )?;
        conflict_ids.push(conflict_id);
    }
    Ok(conflict_ids)
}

/// Get an entry by id.
pub async fn get_entry(db: &Database, id: &str) -> Result<Option<MemoryEntry>, EngramError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn
                .prepare(&format!("SELECT {ENTRY_COLUMNS} FROM memory_entries WHERE id = ?1"))?;
            let result = stmt.query_row(params![id], entry_from_row);
            match result {
                Ok(entry) => Ok(Some(entry)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Batch fetch of live (latest, unarchived) entries by id.
pub async fn get_entries_by_ids(
    db: &Database,
    ids: &[String],
) -> Result<Vec<MemoryEntry>, EngramError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT {ENTRY_COLUMNS} FROM memory_entries
                 WHERE id IN ({}) AND is_latest = 1 AND archived = 0",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let entries = stmt
                .query_map(params.as_slice(), entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// List live entries under a namespace subtree, newest first.
pub async fn list_by_namespace(
    db: &Database,
    org_id: &str,
    namespace: &str,
    limit: usize,
) -> Result<Vec<MemoryEntry>, EngramError> {
    let org_id = org_id.to_string();
    let namespace = namespace.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM memory_entries
                 WHERE org_id = ?1 AND (namespace = ?2 OR namespace LIKE ?2 || '/%')
                   AND is_latest = 1 AND archived = 0
                 ORDER BY created_at DESC
                 LIMIT ?3"
            ))?;
            let entries = stmt
                .query_map(params![org_id, namespace, limit as i64], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// All rows of a version chain, oldest version first.
pub async fn chain_entries(db: &Database, root_id: &str) -> Result<Vec<MemoryEntry>, EngramError> {
    let root_id = root_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM memory_entries
                 WHERE root_id = ?1 ORDER BY version ASC"
            ))?;
            let entries = stmt
                .query_map(params![root_id], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// Lightweight (id, embedding) pairs for vector search over live entries.
pub async fn latest_embeddings(
    db: &Database,
    filter: &EmbeddingFilter,
) -> Result<Vec<(String, Vec<f32>)>, EngramError> {
    let filter = filter.clone();
    db.connection()
        .call(move |conn| {
            let mut sql = String::from(
                "SELECT id, embedding FROM memory_entries
                 WHERE embedding IS NOT NULL AND is_latest = 1 AND archived = 0",
            );
            let mut values: Vec<rusqlite::types::Value> = Vec::new();

            if let Some(org_id) = &filter.org_id {
                values.push(org_id.clone().into());
                sql.push_str(&format!(" AND org_id = ?{}", values.len()));
            }
            if let Some(namespace) = &filter.namespace {
                values.push(namespace.clone().into());
                let n = values.len();
                sql.push_str(&format!(
                    " AND (namespace = ?{n} OR namespace LIKE ?{n} || '/%')"
                ));
            }
            if let Some(pool) = &filter.pool_type {
                values.push(pool.as_str().to_string().into());
                sql.push_str(&format!(" AND pool_type = ?{}", values.len()));
            }
            if let Some(agent_id) = &filter.agent_id {
                values.push(agent_id.clone().into());
                sql.push_str(&format!(" AND agent_id = ?{}", values.len()));
            }
            if let Some(department) = &filter.department {
                values.push(department.clone().into());
                sql.push_str(&format!(" AND department = ?{}", values.len()));
            }
            if let Some(content_type) = &filter.content_type {
                values.push(content_type.as_str().to_string().into());
                sql.push_str(&format!(" AND content_type = ?{}", values.len()));
            }

            let mut stmt = conn.prepare(&sql)?;
            let results = stmt
                .query_map(rusqlite::params_from_iter(values), |row| {
                    let id: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((id, engram_core::types::blob_to_vec(&blob)))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(results)
        })
        .await
        .map_err(map_tr_err)
}

/// Replace an entry's embedding vector.
pub async fn set_embedding(
    db: &Database,
    id: &str,
    embedding: Option<&[f32]>,
) -> Result<(), EngramError> {
    let id = id.to_string();
    let blob = embedding.map(vec_to_blob);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE memory_entries
                 SET embedding = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![blob, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Replace an entry's metadata document.
pub async fn update_metadata(
    db: &Database,
    id: &str,
    metadata: &serde_json::Value,
) -> Result<(), EngramError> {
    let id = id.to_string();
    let metadata = serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string());
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE memory_entries
                 SET metadata = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![metadata, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Count of live entries in a namespace subtree created before `cutoff_iso`.
pub async fn count_older_than(
    db: &Database,
    org_id: &str,
    namespace: &str,
    cutoff_iso: &str,
) -> Result<i64, EngramError> {
    let org_id = org_id.to_string();
    let namespace = namespace.to_string();
    let cutoff = cutoff_iso.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM memory_entries
                 WHERE org_id = ?1 AND (namespace = ?2 OR namespace LIKE ?2 || '/%')
                   AND is_latest = 1 AND archived = 0 AND created_at < ?3",
                params![org_id, namespace, cutoff],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Record an access: bump usage and the accessed timestamp.
pub async fn bump_access(db: &Database, ids: &[String]) -> Result<(), EngramError> {
    if ids.is_empty() {
        return Ok(());
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "UPDATE memory_entries
                 SET usage_count = usage_count + 1,
                     accessed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id IN ({})",
                placeholders.join(", ")
            );
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            conn.execute(&sql, params.as_slice())?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record an external validation of an entry.
pub async fn record_validation(db: &Database, id: &str) -> Result<(), EngramError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE memory_entries
                 SET validation_count = validation_count + 1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Move the `is_latest` pointer of a chain to `target_id`.
///
/// Never deletes or mutates historical rows beyond the pointer flip.
pub async fn rollback_latest(
    db: &Database,
    root_id: &str,
    target_id: &str,
) -> Result<(), EngramError> {
    let root_id = root_id.to_string();
    let target_id = target_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE memory_entries SET is_latest = 0 WHERE root_id = ?1",
                params![root_id],
            )?;
            let flipped = tx.execute(
                "UPDATE memory_entries
                 SET is_latest = 1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND root_id = ?2",
                params![target_id, root_id],
            )?;
            if flipped == 0 {
                return Ok(Err(EngramError::NotFound {
                    kind: "version",
                    id: target_id.clone(),
                }));
            }
            tx.commit()?;
            Ok(Ok(()))
        })
        .await
        .map_err(map_tr_err)?
}

/// Soft delete: expire the row and clear its latest flag.
pub async fn soft_delete(db: &Database, id: &str) -> Result<(), EngramError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE memory_entries
                 SET is_latest = 0,
                     expires_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Demote all but the N most recent versions of a chain to the archived
/// state. Nothing is deleted.
pub async fn mark_old_versions_archived(
    db: &Database,
    root_id: &str,
    keep: usize,
) -> Result<usize, EngramError> {
    let root_id = root_id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE memory_entries SET archived = 1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE root_id = ?1 AND archived = 0 AND id NOT IN (
                     SELECT id FROM memory_entries WHERE root_id = ?1
                     ORDER BY version DESC LIMIT ?2)",
                params![root_id, keep as i64],
            )?;
            Ok(changed)
        })
        .await
        .map_err(map_tr_err)
}

/// Destructive removal of an entire version chain. Scores, relations,
/// entity links, and conflicts cascade via foreign keys. Returns the
/// number of entry rows removed.
pub async fn delete_chain(db: &Database, root_id: &str) -> Result<usize, EngramError> {
    let root_id = root_id.to_string();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM memory_entries WHERE root_id = ?1",
                params![root_id],
            )?;
            Ok(deleted)
        })
        .await
        .map_err(map_tr_err)
}

/// Flip an entry's pool assignment (promotion path).
pub async fn update_pool(db: &Database, id: &str, pool: PoolType) -> Result<(), EngramError> {
    let id = id.to_string();
    let pool = pool.as_str();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE memory_entries
                 SET pool_type = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![pool, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Expire live entries in a namespace subtree created before `cutoff_iso`.
pub async fn expire_older_than(
    db: &Database,
    org_id: &str,
    namespace: &str,
    cutoff_iso: &str,
) -> Result<usize, EngramError> {
    let org_id = org_id.to_string();
    let namespace = namespace.to_string();
    let cutoff = cutoff_iso.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE memory_entries
                 SET is_latest = 0,
                     expires_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE org_id = ?1 AND (namespace = ?2 OR namespace LIKE ?2 || '/%')
                   AND is_latest = 1 AND archived = 0 AND created_at < ?3",
                params![org_id, namespace, cutoff],
            )?;
            Ok(changed)
        })
        .await
        .map_err(map_tr_err)
}

/// Expire the oldest live entries beyond `max_count` in a namespace subtree.
pub async fn trim_to_count(
    db: &Database,
    org_id: &str,
    namespace: &str,
    max_count: usize,
) -> Result<usize, EngramError> {
    let org_id = org_id.to_string();
    let namespace = namespace.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE memory_entries
                 SET is_latest = 0,
                     expires_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id IN (
                     SELECT id FROM memory_entries
                     WHERE org_id = ?1 AND (namespace = ?2 OR namespace LIKE ?2 || '/%')
                       AND is_latest = 1 AND archived = 0
                     ORDER BY created_at DESC
                     LIMIT -1 OFFSET ?3)",
                params![org_id, namespace, max_count as i64],
            )?;
            Ok(changed)
        })
        .await
        .map_err(map_tr_err)
}

/// Count of live entries in a namespace subtree.
pub async fn count_in_namespace(
    db: &Database,
    org_id: &str,
    namespace: &str,
) -> Result<i64, EngramError> {
    let org_id = org_id.to_string();
    let namespace = namespace.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM memory_entries
                 WHERE org_id = ?1 AND (namespace = ?2 OR namespace LIKE ?2 || '/%')
                   AND is_latest = 1 AND archived = 0",
                params![org_id, namespace],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Live entries created within `window_hours` of `center_iso`, excluding
/// the chain the anchor entry belongs to. Temporal-proximity candidates
/// for relation building.
pub async fn temporal_neighbors(
    db: &Database,
    org_id: &str,
    center_iso: &str,
    window_hours: i64,
    exclude_root: &str,
) -> Result<Vec<MemoryEntry>, EngramError> {
    let org_id = org_id.to_string();
    let center = center_iso.to_string();
    let exclude_root = exclude_root.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM memory_entries
                 WHERE org_id = ?1 AND is_latest = 1 AND archived = 0
                   AND root_id != ?2
                   AND created_at >= strftime('%Y-%m-%dT%H:%M:%fZ', ?3, '-' || ?4 || ' hours')
                   AND created_at <= strftime('%Y-%m-%dT%H:%M:%fZ', ?3, '+' || ?4 || ' hours')
                 ORDER BY created_at DESC"
            ))?;
            let entries = stmt
                .query_map(params![org_id, exclude_root, center, window_hours], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// High-signal candidates for the semantic conflict scan: live, trusted,
/// frequently used, and recent.
pub async fn strategic_pool(
    db: &Database,
    org_id: &str,
    min_confidence: f64,
    min_usage: i64,
    max_age_days: i64,
) -> Result<Vec<MemoryEntry>, EngramError> {
    let org_id = org_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM memory_entries
                 WHERE org_id = ?1 AND is_latest = 1 AND archived = 0
                   AND confidence >= ?2 AND usage_count >= ?3
                   AND created_at >= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-' || ?4 || ' days')
                 ORDER BY created_at DESC"
            ))?;
            let entries = stmt
                .query_map(
                    params![org_id, min_confidence, min_usage, max_age_days],
                    entry_from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}

/// Domain-pool entries joined with their cached final score, for the
/// promotion scan. Threshold checks happen in the promoter so per-pool
/// overrides can apply.
pub async fn domain_promotion_candidates(
    db: &Database,
) -> Result<Vec<(MemoryEntry, f64)>, EngramError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS}, s.final_score
                 FROM memory_entries JOIN memory_scores s ON s.entry_id = memory_entries.id
                 WHERE pool_type = 'domain' AND is_latest = 1 AND archived = 0"
            ))?;
            let rows = stmt
                .query_map([], |row| {
                    let entry = entry_from_row(row)?;
                    let final_score: f64 = row.get(28)?;
                    Ok((entry, final_score))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Per-pool (count, average final score) for an organization.
pub async fn pool_stats(
    db: &Database,
    org_id: &str,
) -> Result<Vec<(PoolType, i64, f64)>, EngramError> {
    let org_id = org_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT pool_type, COUNT(*), COALESCE(AVG(s.final_score), 0.0)
                 FROM memory_entries m LEFT JOIN memory_scores s ON s.entry_id = m.id
                 WHERE m.org_id = ?1 AND m.is_latest = 1 AND m.archived = 0
                 GROUP BY pool_type",
            )?;
            let rows = stmt
                .query_map(params![org_id], |row| {
                    let pool: String = row.get(0)?;
                    Ok((PoolType::from_str_value(&pool), row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}
