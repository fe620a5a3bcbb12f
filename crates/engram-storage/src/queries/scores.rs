// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cached score upserts and reads.
//!
//! Score rows are strictly row-scoped upserts, safe to recompute from
//! concurrent workers.

use std::collections::HashMap;

use engram_core::types::MemoryScore;
use engram_core::EngramError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{entry_from_row, ENTRY_COLUMNS};

/// Upsert the cached score for an entry.
pub async fn upsert_score(
    db: &Database,
    entry_id: &str,
    score: MemoryScore,
) -> Result<(), EngramError> {
    let entry_id = entry_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO memory_scores (entry_id, base_score, decay_multiplier, final_score,
                        last_calculated)
                 VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT(entry_id) DO UPDATE SET
                     base_score = excluded.base_score,
                     decay_multiplier = excluded.decay_multiplier,
                     final_score = excluded.final_score,
                     last_calculated = excluded.last_calculated",
                params![entry_id, score.base_score, score.decay_multiplier, score.final_score],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get the cached score for an entry.
pub async fn get_score(db: &Database, entry_id: &str) -> Result<Option<MemoryScore>, EngramError> {
    let entry_id = entry_id.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT base_score, decay_multiplier, final_score
                 FROM memory_scores WHERE entry_id = ?1",
                params![entry_id],
                |row| {
                    Ok(MemoryScore {
                        base_score: row.get(0)?,
                        decay_multiplier: row.get(1)?,
                        final_score: row.get(2)?,
                    })
                },
            );
            match result {
                Ok(score) => Ok(Some(score)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Batch score lookup keyed by entry id.
pub async fn get_scores_by_ids(
    db: &Database,
    ids: &[String],
) -> Result<HashMap<String, MemoryScore>, EngramError> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT entry_id, base_score, decay_multiplier, final_score
                 FROM memory_scores WHERE entry_id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let mut map = HashMap::new();
            let rows = stmt.query_map(params.as_slice(), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    MemoryScore {
                        base_score: row.get(1)?,
                        decay_multiplier: row.get(2)?,
                        final_score: row.get(3)?,
                    },
                ))
            })?;
            for row in rows {
                let (id, score) = row?;
                map.insert(id, score);
            }
            Ok(map)
        })
        .await
        .map_err(map_tr_err)
}

/// Live entries whose cached score is missing or older than `cutoff_iso`.
/// Feed for the decay-recomputation sweep.
pub async fn stale_entries(
    db: &Database,
    cutoff_iso: &str,
    limit: usize,
) -> Result<Vec<engram_core::types::MemoryEntry>, EngramError> {
    let cutoff = cutoff_iso.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM memory_entries
                 LEFT JOIN memory_scores s ON s.entry_id = memory_entries.id
                 WHERE is_latest = 1 AND archived = 0
                   AND (s.entry_id IS NULL OR s.last_calculated < ?1)
                 ORDER BY created_at ASC
                 LIMIT ?2"
            ))?;
            let entries = stmt
                .query_map(params![cutoff, limit as i64], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
        .map_err(map_tr_err)
}
