// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Organization CRUD and quota reads.
//!
//! The quota counter is only ever incremented inside the entry-insert
//! transaction (see `queries::entries`), so reads here may be slightly
//! stale but increments never race.

use engram_core::types::QuotaStatus;
use engram_core::EngramError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::Organization;

/// Create an organization with the given quota ceiling.
pub async fn create_org(
    db: &Database,
    id: &str,
    name: &str,
    quota_max: i64,
) -> Result<(), EngramError> {
    let id = id.to_string();
    let name = name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO organizations (id, name, quota_max) VALUES (?1, ?2, ?3)",
                params![id, name, quota_max],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get an organization by id.
pub async fn get_org(db: &Database, id: &str) -> Result<Option<Organization>, EngramError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, quota_max, quota_used, created_at, updated_at
                 FROM organizations WHERE id = ?1",
            )?;
            let result = stmt.query_row(params![id], |row| {
                Ok(Organization {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    quota_max: row.get(2)?,
                    quota_used: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            });
            match result {
                Ok(org) => Ok(Some(org)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Current quota state for an organization.
pub async fn quota(db: &Database, org_id: &str) -> Result<QuotaStatus, EngramError> {
    let org = get_org(db, org_id).await?.ok_or_else(|| EngramError::NotFound {
        kind: "organization",
        id: org_id.to_string(),
    })?;
    Ok(QuotaStatus {
        max: org.quota_max,
        used: org.quota_used,
    })
}

/// List all organization ids.
pub async fn list_org_ids(db: &Database) -> Result<Vec<String>, EngramError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM organizations ORDER BY id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_read_quota() {
        let db = Database::open_in_memory().await.unwrap();
        create_org(&db, "acme", "Acme Corp", 500).await.unwrap();

        let status = quota(&db, "acme").await.unwrap();
        assert_eq!(status.max, 500);
        assert_eq!(status.used, 0);

        let org = get_org(&db, "acme").await.unwrap().unwrap();
        assert_eq!(org.name, "Acme Corp");
    }

    #[tokio::test]
    async fn quota_for_missing_org_errors() {
        let db = Database::open_in_memory().await.unwrap();
        let err = quota(&db, "ghost").await.unwrap_err();
        assert!(matches!(err, EngramError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_org_ids_sorted() {
        let db = Database::open_in_memory().await.unwrap();
        create_org(&db, "beta", "Beta", 10).await.unwrap();
        create_org(&db, "alpha", "Alpha", 10).await.unwrap();
        assert_eq!(list_org_ids(&db).await.unwrap(), vec!["alpha", "beta"]);
    }
}
