// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Governance policy storage.

use engram_core::types::{MemoryPolicy, PolicyType};
use engram_core::EngramError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{policy_from_row, POLICY_COLUMNS};

/// Insert or replace the policy for (org, namespace, type). Returns the
/// policy id.
pub async fn upsert_policy(
    db: &Database,
    org_id: &str,
    namespace: &str,
    policy_type: PolicyType,
    rules: &serde_json::Value,
) -> Result<String, EngramError> {
    let org_id = org_id.to_string();
    let namespace = namespace.to_string();
    let rules = serde_json::to_string(rules).unwrap_or_else(|_| "{}".to_string());
    let id = uuid::Uuid::new_v4().to_string();
    let returned_id = id.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO memory_policies (id, org_id, namespace, policy_type, rules)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(org_id, namespace, policy_type) DO UPDATE SET
                     rules = excluded.rules,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![id, org_id, namespace, policy_type.as_str(), rules],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(returned_id)
}

/// Exact (org, namespace, type) policy lookup.
pub async fn get_policy(
    db: &Database,
    org_id: &str,
    namespace: &str,
    policy_type: PolicyType,
) -> Result<Option<MemoryPolicy>, EngramError> {
    let org_id = org_id.to_string();
    let namespace = namespace.to_string();
    let policy_type = policy_type.as_str();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POLICY_COLUMNS} FROM memory_policies
                 WHERE org_id = ?1 AND namespace = ?2 AND policy_type = ?3"
            ))?;
            let result = stmt.query_row(params![org_id, namespace, policy_type], policy_from_row);
            match result {
                Ok(policy) => Ok(Some(policy)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// All policies for an organization, optionally filtered by type.
pub async fn list_policies(
    db: &Database,
    org_id: &str,
    policy_type: Option<PolicyType>,
) -> Result<Vec<MemoryPolicy>, EngramError> {
    let org_id = org_id.to_string();
    let policy_type = policy_type.map(|p| p.as_str().to_string());
    db.connection()
        .call(move |conn| {
            let mut policies = Vec::new();
            match &policy_type {
                Some(type_filter) => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {POLICY_COLUMNS} FROM memory_policies
                         WHERE org_id = ?1 AND policy_type = ?2 ORDER BY namespace"
                    ))?;
                    let rows = stmt.query_map(params![org_id, type_filter], policy_from_row)?;
                    for row in rows {
                        policies.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {POLICY_COLUMNS} FROM memory_policies
                         WHERE org_id = ?1 ORDER BY namespace, policy_type"
                    ))?;
                    let rows = stmt.query_map(params![org_id], policy_from_row)?;
                    for row in rows {
                        policies.push(row?);
                    }
                }
            }
            Ok(policies)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove the policy for (org, namespace, type). Returns whether a row
/// was deleted.
pub async fn delete_policy(
    db: &Database,
    org_id: &str,
    namespace: &str,
    policy_type: PolicyType,
) -> Result<bool, EngramError> {
    let org_id = org_id.to_string();
    let namespace = namespace.to_string();
    let policy_type = policy_type.as_str();
    db.connection()
        .call(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM memory_policies
                 WHERE org_id = ?1 AND namespace = ?2 AND policy_type = ?3",
                params![org_id, namespace, policy_type],
            )?;
            Ok(deleted > 0)
        })
        .await
        .map_err(map_tr_err)
}
