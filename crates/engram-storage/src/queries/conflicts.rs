// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conflict row storage and lifecycle transitions.
//!
//! Claim-mismatch conflicts are created inside the entry-insert
//! transaction (`queries::entries`); this module covers semantic
//! conflicts, reads, and the pending → queued/resolved/ignored
//! transitions.

use engram_core::types::{ConflictStatus, ConflictType, MemoryConflict};
use engram_core::EngramError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{conflict_from_row, CONFLICT_COLUMNS};

/// Insert a conflict unless the pair is already linked by one (in any
/// status, either orientation). Returns the new conflict id, or `None`
/// when suppressed as a duplicate.
pub async fn insert_conflict(
    db: &Database,
    org_id: &str,
    first_id: &str,
    second_id: &str,
    conflict_type: ConflictType,
) -> Result<Option<String>, EngramError> {
    let org_id = org_id.to_string();
    let first_id = first_id.to_string();
    let second_id = second_id.to_string();
    db.connection()
        .call(move |conn| {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memory_conflicts
                 WHERE (first_id = ?1 AND second_id = ?2)
                    OR (first_id = ?2 AND second_id = ?1)",
                params![first_id, second_id],
                |row| row.get(0),
            )?;
            if exists > 0 {
                return Ok(None);
            }
            let id = uuid::Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO memory_conflicts (id, org_id, first_id, second_id, conflict_type,
                        status)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending')",
                params![id, org_id, first_id, second_id, conflict_type.as_str()],
            )?;
            Ok(Some(id))
        })
        .await
        .map_err(map_tr_err)
}

/// Get a conflict by id.
pub async fn get_conflict(db: &Database, id: &str) -> Result<Option<MemoryConflict>, EngramError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONFLICT_COLUMNS} FROM memory_conflicts WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id], conflict_from_row);
            match result {
                Ok(conflict) => Ok(Some(conflict)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List conflicts for an organization, optionally filtered by status,
/// newest first.
pub async fn list_conflicts(
    db: &Database,
    org_id: &str,
    status: Option<ConflictStatus>,
    limit: usize,
) -> Result<Vec<MemoryConflict>, EngramError> {
    let org_id = org_id.to_string();
    let status = status.map(|s| s.as_str().to_string());
    db.connection()
        .call(move |conn| {
            let mut conflicts = Vec::new();
            match &status {
                Some(status_filter) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CONFLICT_COLUMNS} FROM memory_conflicts
                         WHERE org_id = ?1 AND status = ?2
                         ORDER BY created_at DESC LIMIT ?3"
                    ))?;
                    let rows =
                        stmt.query_map(params![org_id, status_filter, limit as i64], conflict_from_row)?;
                    for row in rows {
                        conflicts.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {CONFLICT_COLUMNS} FROM memory_conflicts
                         WHERE org_id = ?1 ORDER BY created_at DESC LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![org_id, limit as i64], conflict_from_row)?;
                    for row in rows {
                        conflicts.push(row?);
                    }
                }
            }
            Ok(conflicts)
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a conflict resolved with its winner, resolver tag, and explanation.
pub async fn resolve_conflict(
    db: &Database,
    id: &str,
    winning_id: &str,
    resolved_by: &str,
    explanation: &str,
) -> Result<(), EngramError> {
    let id = id.to_string();
    let winning_id = winning_id.to_string();
    let resolved_by = resolved_by.to_string();
    let explanation = explanation.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE memory_conflicts
                 SET status = 'resolved', winning_id = ?1, resolved_by = ?2, explanation = ?3,
                     resolved_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?4",
                params![winning_id, resolved_by, explanation, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Transition a conflict's status without resolving it
/// (pending ↔ queued, or → ignored).
pub async fn set_status(
    db: &Database,
    id: &str,
    status: ConflictStatus,
) -> Result<(), EngramError> {
    let id = id.to_string();
    let status = status.as_str();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE memory_conflicts SET status = ?1 WHERE id = ?2",
                params![status, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Conflict counts grouped by (status, conflict_type).
pub async fn conflict_stats(
    db: &Database,
    org_id: &str,
) -> Result<Vec<(ConflictStatus, ConflictType, i64)>, EngramError> {
    let org_id = org_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT status, conflict_type, COUNT(*) FROM memory_conflicts
                 WHERE org_id = ?1 GROUP BY status, conflict_type",
            )?;
            let rows = stmt
                .query_map(params![org_id], |row| {
                    let status: String = row.get(0)?;
                    let ctype: String = row.get(1)?;
                    Ok((
                        ConflictStatus::from_str_value(&status),
                        ConflictType::from_str_value(&ctype),
                        row.get(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::entries::insert_entry_with_quota;
    use crate::test_support::{make_entry, setup_org_db};

    async fn seed(db: &Database) {
        insert_entry_with_quota(db, &make_entry("a", "acme/eng")).await.unwrap();
        insert_entry_with_quota(db, &make_entry("b", "acme/eng")).await.unwrap();
    }

    #[tokio::test]
    async fn insert_and_lifecycle() {
        let db = setup_org_db().await;
        seed(&db).await;

        let id = insert_conflict(&db, "acme", "a", "b", ConflictType::SemanticContradiction)
            .await
            .unwrap()
            .unwrap();

        let conflict = get_conflict(&db, &id).await.unwrap().unwrap();
        assert_eq!(conflict.status, ConflictStatus::Pending);
        assert_eq!(conflict.conflict_type, ConflictType::SemanticContradiction);

        set_status(&db, &id, ConflictStatus::Queued).await.unwrap();
        assert_eq!(
            get_conflict(&db, &id).await.unwrap().unwrap().status,
            ConflictStatus::Queued
        );

        resolve_conflict(&db, &id, "a", "strategy:score-wins", "higher cached score")
            .await
            .unwrap();
        let resolved = get_conflict(&db, &id).await.unwrap().unwrap();
        assert_eq!(resolved.status, ConflictStatus::Resolved);
        assert_eq!(resolved.winning_id.as_deref(), Some("a"));
        assert!(resolved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_pair_suppressed_either_orientation() {
        let db = setup_org_db().await;
        seed(&db).await;

        let first = insert_conflict(&db, "acme", "a", "b", ConflictType::ClaimMismatch)
            .await
            .unwrap();
        assert!(first.is_some());

        let dup = insert_conflict(&db, "acme", "b", "a", ConflictType::SemanticContradiction)
            .await
            .unwrap();
        assert!(dup.is_none(), "reversed pair must be suppressed");
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let db = setup_org_db().await;
        seed(&db).await;
        insert_entry_with_quota(&db, &make_entry("c", "acme/eng")).await.unwrap();

        let c1 = insert_conflict(&db, "acme", "a", "b", ConflictType::ClaimMismatch)
            .await
            .unwrap()
            .unwrap();
        insert_conflict(&db, "acme", "a", "c", ConflictType::ClaimMismatch)
            .await
            .unwrap()
            .unwrap();

        set_status(&db, &c1, ConflictStatus::Ignored).await.unwrap();

        let pending = list_conflicts(&db, "acme", Some(ConflictStatus::Pending), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        let all = list_conflicts(&db, "acme", None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn stats_group_by_status_and_type() {
        let db = setup_org_db().await;
        seed(&db).await;

        insert_conflict(&db, "acme", "a", "b", ConflictType::ClaimMismatch)
            .await
            .unwrap();
        let stats = conflict_stats(&db, "acme").await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(
            stats[0],
            (ConflictStatus::Pending, ConflictType::ClaimMismatch, 1)
        );
    }
}
