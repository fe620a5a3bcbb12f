// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Crash-safe task queue operations with scheduling and exponential backoff.
//!
//! Jobs become runnable once `run_after` passes. Failed jobs are retried
//! with `backoff_base_secs * 2^attempts` delay until `max_attempts`.

use engram_core::types::JobOptions;
use engram_core::EngramError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::QueueEntry;

const QUEUE_COLUMNS: &str = "id, queue_name, payload, status, priority, attempts, \
     max_attempts, run_after, backoff_base_secs, locked_until, created_at, updated_at";

fn queue_entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: row.get(0)?,
        queue_name: row.get(1)?,
        payload: row.get(2)?,
        status: row.get(3)?,
        priority: row.get(4)?,
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        run_after: row.get(7)?,
        backoff_base_secs: row.get(8)?,
        locked_until: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Enqueue a new job. Returns the auto-generated queue entry ID.
pub async fn enqueue(
    db: &Database,
    queue_name: &str,
    payload: &str,
    options: JobOptions,
) -> Result<i64, EngramError> {
    let queue_name = queue_name.to_string();
    let payload = payload.to_string();
    let delay_secs = options.delay.map(|d| d.as_secs() as i64).unwrap_or(0);
    let backoff_secs = options.backoff.as_secs().max(1) as i64;
    let max_attempts = options.retries.max(1) as i64;
    let priority = options.priority;

    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO task_queue (queue_name, payload, priority, max_attempts,
                        backoff_base_secs, run_after)
                 VALUES (?1, ?2, ?3, ?4, ?5,
                         strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?6 || ' seconds'))",
                params![queue_name, payload, priority, max_attempts, backoff_secs, delay_secs],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
        .map_err(map_tr_err)
}

/// Dequeue the next runnable entry from the named queue.
///
/// Atomically selects the highest-priority pending entry whose `run_after`
/// has passed and marks it "processing" with a 5-minute lock timeout.
/// Returns `None` if nothing is runnable.
pub async fn dequeue(db: &Database, queue_name: &str) -> Result<Option<QueueEntry>, EngramError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let result = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {QUEUE_COLUMNS} FROM task_queue
                     WHERE queue_name = ?1 AND status = 'pending'
                       AND run_after <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     ORDER BY priority DESC, id ASC
                     LIMIT 1"
                ))?;
                stmt.query_row(params![queue_name], queue_entry_from_row)
            };

            match result {
                Ok(entry) => {
                    tx.execute(
                        "UPDATE task_queue SET status = 'processing',
                         locked_until = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+5 minutes'),
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?1",
                        params![entry.id],
                    )?;
                    tx.commit()?;

                    Ok(Some(QueueEntry {
                        status: "processing".to_string(),
                        ..entry
                    }))
                }
                Err(rusqlite::Error::QueryReturnedNoRows) => {
                    tx.commit()?;
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Acknowledge successful processing of a queue entry.
pub async fn ack(db: &Database, id: i64) -> Result<(), EngramError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE task_queue SET status = 'completed',
                 locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a queue entry as failed.
///
/// Increments attempts. If attempts >= max_attempts, sets status to "failed".
/// Otherwise resets to "pending" with exponential backoff: the entry only
/// becomes runnable again after `backoff_base_secs * 2^attempts`.
pub async fn fail(db: &Database, id: i64) -> Result<(), EngramError> {
    db.connection()
        .call(move |conn| {
            let (attempts, max_attempts, backoff_base): (i64, i64, i64) = conn.query_row(
                "SELECT attempts, max_attempts, backoff_base_secs FROM task_queue WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let new_attempts = attempts + 1;
            if new_attempts >= max_attempts {
                conn.execute(
                    "UPDATE task_queue SET status = 'failed', attempts = ?1,
                     locked_until = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![new_attempts, id],
                )?;
            } else {
                // Exponential backoff: base * 2^attempts, capped at one hour.
                let delay_secs = (backoff_base << new_attempts.min(16)).min(3600);
                conn.execute(
                    "UPDATE task_queue SET status = 'pending', attempts = ?1,
                     locked_until = NULL,
                     run_after = strftime('%Y-%m-%dT%H:%M:%fZ', 'now', ?2 || ' seconds'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?3",
                    params![new_attempts, delay_secs, id],
                )?;
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Counts of queue entries by status for the named queue.
pub async fn depth(db: &Database, queue_name: &str) -> Result<(i64, i64, i64), EngramError> {
    let queue_name = queue_name.to_string();
    db.connection()
        .call(move |conn| {
            let row = conn.query_row(
                "SELECT
                    COALESCE(SUM(status = 'pending'), 0),
                    COALESCE(SUM(status = 'processing'), 0),
                    COALESCE(SUM(status = 'failed'), 0)
                 FROM task_queue WHERE queue_name = ?1",
                params![queue_name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)
}
