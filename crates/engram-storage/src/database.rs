// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use engram_core::EngramError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations;

/// Convert tokio_rusqlite errors into `EngramError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> EngramError {
    EngramError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the SQLite database backing the memory store.
///
/// Cheap to clone; all clones share the single writer connection.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs, and run
    /// all pending migrations.
    pub async fn open(path: &str) -> Result<Self, EngramError> {
        let conn = Connection::open(path).await.map_err(map_tr_err)?;
        let db = Self { conn };
        db.initialize(true).await?;
        debug!(path, "database opened");
        Ok(db)
    }

    /// Open an in-memory database with the full schema. Test-oriented,
    /// but also used by the CLI for dry runs.
    pub async fn open_in_memory() -> Result<Self, EngramError> {
        let conn = Connection::open_in_memory().await.map_err(map_tr_err)?;
        let db = Self { conn };
        db.initialize(false).await?;
        Ok(db)
    }

    async fn initialize(&self, wal: bool) -> Result<(), EngramError> {
        self.conn
            .call(move |conn| {
                if wal {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                }
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                migrations::run_migrations(conn)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Access the underlying connection for query modules.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the database, flushing WAL state.
    pub async fn close(self) -> Result<(), EngramError> {
        self.conn.close().await.map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("engram.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();

        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                     AND name IN ('organizations', 'memory_entries', 'memory_scores',
                                  'memory_relations', 'memory_conflicts', 'memory_policies',
                                  'entity_tags', 'entry_entities', 'task_queue')",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 9, "all nine tables should exist");

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("engram.db");

        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();

        // Second open must not re-run V1 against existing tables.
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn in_memory_open_works() {
        let db = Database::open_in_memory().await.unwrap();
        let count: i64 = db
            .connection()
            .call(|conn| {
                let n = conn.query_row("SELECT COUNT(*) FROM memory_entries", [], |row| {
                    row.get(0)
                })?;
                Ok(n)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
