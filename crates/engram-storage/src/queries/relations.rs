// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relation graph edge storage.
//!
//! The graph is persisted as an edge table with indices on source, target,
//! and type. Traversals load edge frontiers through `edges_touching` /
//! `edges_from` and carry their own visited-sets and depth bounds.

use engram_core::types::{InferredBy, MemoryRelation, RelationType};
use engram_core::EngramError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{relation_from_row, RELATION_COLUMNS};

/// Insert or refresh an edge. The (source, target, type) triple is unique;
/// re-inference overwrites strength and reason.
pub async fn upsert_relation(
    db: &Database,
    source_id: &str,
    target_id: &str,
    relation_type: RelationType,
    strength: f64,
    reason: &str,
    inferred_by: InferredBy,
) -> Result<(), EngramError> {
    let source_id = source_id.to_string();
    let target_id = target_id.to_string();
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO memory_relations (source_id, target_id, relation_type, strength,
                        reason, inferred_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(source_id, target_id, relation_type) DO UPDATE SET
                     strength = excluded.strength,
                     reason = excluded.reason,
                     inferred_by = excluded.inferred_by",
                params![
                    source_id,
                    target_id,
                    relation_type.as_str(),
                    strength,
                    reason,
                    inferred_by.as_str()
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Edges whose source OR target is in `ids`, optionally restricted to the
/// given relation types. Frontier load for undirected BFS expansion.
pub async fn edges_touching(
    db: &Database,
    ids: &[String],
    relation_types: Option<&[RelationType]>,
) -> Result<Vec<MemoryRelation>, EngramError> {
    load_edges(db, ids, relation_types, false).await
}

/// Directed edges out of `ids`, optionally restricted by type. Used by
/// inference-path discovery.
pub async fn edges_from(
    db: &Database,
    ids: &[String],
    relation_types: Option<&[RelationType]>,
) -> Result<Vec<MemoryRelation>, EngramError> {
    load_edges(db, ids, relation_types, true).await
}

async fn load_edges(
    db: &Database,
    ids: &[String],
    relation_types: Option<&[RelationType]>,
    directed: bool,
) -> Result<Vec<MemoryRelation>, EngramError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    let type_strs: Option<Vec<&'static str>> =
        relation_types.map(|ts| ts.iter().map(|t| t.as_str()).collect());
    db.connection()
        .call(move |conn| {
            let id_placeholders: Vec<String> =
                (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let endpoint = if directed {
                format!("source_id IN ({})", id_placeholders.join(", "))
            } else {
                format!(
                    "(source_id IN ({0}) OR target_id IN ({0}))",
                    id_placeholders.join(", ")
                )
            };

            let mut sql = format!("SELECT {RELATION_COLUMNS} FROM memory_relations WHERE {endpoint}");
            let mut values: Vec<rusqlite::types::Value> =
                ids.iter().map(|id| id.clone().into()).collect();

            if let Some(types) = &type_strs {
                let start = values.len() + 1;
                let type_placeholders: Vec<String> = (0..types.len())
                    .map(|i| format!("?{}", start + i))
                    .collect();
                sql.push_str(&format!(
                    " AND relation_type IN ({})",
                    type_placeholders.join(", ")
                ));
                for t in types {
                    values.push(t.to_string().into());
                }
            }

            let mut stmt = conn.prepare(&sql)?;
            let edges = stmt
                .query_map(rusqlite::params_from_iter(values), relation_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(edges)
        })
        .await
        .map_err(map_tr_err)
}

/// Total number of edges incident to an entry.
pub async fn relation_count(db: &Database, entry_id: &str) -> Result<i64, EngramError> {
    let entry_id = entry_id.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM memory_relations WHERE source_id = ?1 OR target_id = ?1",
                params![entry_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::entries::insert_entry_with_quota;
    use crate::test_support::{make_entry, setup_org_db};

    async fn seed(db: &Database, ids: &[&str]) {
        for id in ids {
            insert_entry_with_quota(db, &make_entry(id, "acme/eng")).await.unwrap();
        }
    }

    #[tokio::test]
    async fn upsert_deduplicates_on_triple() {
        let db = setup_org_db().await;
        seed(&db, &["a", "b"]).await;

        upsert_relation(&db, "a", "b", RelationType::Causes, 0.7, "first", InferredBy::Rule)
            .await
            .unwrap();
        upsert_relation(&db, "a", "b", RelationType::Causes, 0.9, "refined", InferredBy::Model)
            .await
            .unwrap();

        let edges = edges_from(&db, &["a".to_string()], None).await.unwrap();
        assert_eq!(edges.len(), 1, "same triple must not duplicate");
        assert_eq!(edges[0].strength, 0.9);
        assert_eq!(edges[0].reason, "refined");
        assert_eq!(edges[0].inferred_by, InferredBy::Model);
    }

    #[tokio::test]
    async fn different_types_between_same_pair_coexist() {
        let db = setup_org_db().await;
        seed(&db, &["a", "b"]).await;

        upsert_relation(&db, "a", "b", RelationType::Causes, 0.7, "", InferredBy::Rule)
            .await
            .unwrap();
        upsert_relation(&db, "a", "b", RelationType::Supports, 0.6, "", InferredBy::Rule)
            .await
            .unwrap();

        let edges = edges_from(&db, &["a".to_string()], None).await.unwrap();
        assert_eq!(edges.len(), 2);
    }

    #[tokio::test]
    async fn touching_finds_both_directions() {
        let db = setup_org_db().await;
        seed(&db, &["a", "b", "c"]).await;

        upsert_relation(&db, "a", "b", RelationType::Causes, 0.7, "", InferredBy::Rule)
            .await
            .unwrap();
        upsert_relation(&db, "c", "a", RelationType::Supports, 0.8, "", InferredBy::Rule)
            .await
            .unwrap();

        let edges = edges_touching(&db, &["a".to_string()], None).await.unwrap();
        assert_eq!(edges.len(), 2);

        let directed = edges_from(&db, &["a".to_string()], None).await.unwrap();
        assert_eq!(directed.len(), 1);
        assert_eq!(directed[0].target_id, "b");
    }

    #[tokio::test]
    async fn type_filter_restricts_edges() {
        let db = setup_org_db().await;
        seed(&db, &["a", "b", "c"]).await;

        upsert_relation(&db, "a", "b", RelationType::Causes, 0.7, "", InferredBy::Rule)
            .await
            .unwrap();
        upsert_relation(&db, "a", "c", RelationType::Contradicts, 0.9, "", InferredBy::Model)
            .await
            .unwrap();

        let causes = edges_from(
            &db,
            &["a".to_string()],
            Some(&[RelationType::Causes]),
        )
        .await
        .unwrap();
        assert_eq!(causes.len(), 1);
        assert_eq!(causes[0].relation_type, RelationType::Causes);
    }

    #[tokio::test]
    async fn count_is_incident_edges() {
        let db = setup_org_db().await;
        seed(&db, &["a", "b", "c"]).await;

        upsert_relation(&db, "a", "b", RelationType::Causes, 0.7, "", InferredBy::Rule)
            .await
            .unwrap();
        upsert_relation(&db, "c", "a", RelationType::Supports, 0.8, "", InferredBy::Rule)
            .await
            .unwrap();

        assert_eq!(relation_count(&db, "a").await.unwrap(), 2);
        assert_eq!(relation_count(&db, "b").await.unwrap(), 1);
    }
}
