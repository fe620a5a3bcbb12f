// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entity tag storage and entry↔entity links.
//!
//! Tags are normalized per (org, name, type); repeated mentions bump the
//! counter and keep the highest confidence seen. Co-occurrence queries
//! seed relation-candidate discovery.

use engram_core::types::EntityTag;
use engram_core::EngramError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::entity_from_row;

/// Insert or bump an entity tag. Returns the tag id.
pub async fn upsert_entity(
    db: &Database,
    org_id: &str,
    name: &str,
    entity_type: &str,
    confidence: f64,
) -> Result<i64, EngramError> {
    let org_id = org_id.to_string();
    let name = name.to_string();
    let entity_type = entity_type.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO entity_tags (org_id, name, entity_type, mention_count, confidence)
                 VALUES (?1, ?2, ?3, 1, ?4)
                 ON CONFLICT(org_id, name, entity_type) DO UPDATE SET
                     mention_count = mention_count + 1,
                     confidence = MAX(confidence, excluded.confidence)",
                params![org_id, name, entity_type, confidence],
            )?;
            let id = conn.query_row(
                "SELECT id FROM entity_tags WHERE org_id = ?1 AND name = ?2 AND entity_type = ?3",
                params![org_id, name, entity_type],
                |row| row.get(0),
            )?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

/// Link an entry to an entity tag (idempotent).
pub async fn link_entity(db: &Database, entry_id: &str, entity_id: i64) -> Result<(), EngramError> {
    let entry_id = entry_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO entry_entities (entry_id, entity_id) VALUES (?1, ?2)",
                params![entry_id, entity_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All entity tags linked to an entry.
pub async fn entities_for_entry(
    db: &Database,
    entry_id: &str,
) -> Result<Vec<EntityTag>, EngramError> {
    let entry_id = entry_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.org_id, t.name, t.entity_type, t.mention_count, t.confidence
                 FROM entity_tags t
                 JOIN entry_entities ee ON ee.entity_id = t.id
                 WHERE ee.entry_id = ?1
                 ORDER BY t.name",
            )?;
            let tags = stmt
                .query_map(params![entry_id], entity_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(tags)
        })
        .await
        .map_err(map_tr_err)
}

/// Ids of live entries sharing at least one entity with the given entry,
/// ordered by number of shared entities.
pub async fn co_occurring_entries(
    db: &Database,
    entry_id: &str,
    limit: usize,
) -> Result<Vec<String>, EngramError> {
    let entry_id = entry_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT other.entry_id, COUNT(*) AS shared
                 FROM entry_entities mine
                 JOIN entry_entities other
                   ON other.entity_id = mine.entity_id AND other.entry_id != mine.entry_id
                 JOIN memory_entries m ON m.id = other.entry_id
                 WHERE mine.entry_id = ?1 AND m.is_latest = 1 AND m.archived = 0
                 GROUP BY other.entry_id
                 ORDER BY shared DESC
                 LIMIT ?2",
            )?;
            let ids = stmt
                .query_map(params![entry_id, limit as i64], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::entries::insert_entry_with_quota;
    use crate::test_support::{make_entry, setup_org_db};

    #[tokio::test]
    async fn upsert_bumps_mentions_and_keeps_best_confidence() {
        let db = setup_org_db().await;

        let id1 = upsert_entity(&db, "acme", "postgresql", "technology", 0.8).await.unwrap();
        let id2 = upsert_entity(&db, "acme", "postgresql", "technology", 0.6).await.unwrap();
        assert_eq!(id1, id2);

        insert_entry_with_quota(&db, &make_entry("m-1", "acme/eng")).await.unwrap();
        link_entity(&db, "m-1", id1).await.unwrap();

        let tags = entities_for_entry(&db, "m-1").await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].mention_count, 2);
        assert_eq!(tags[0].confidence, 0.8);
    }

    #[tokio::test]
    async fn co_occurrence_orders_by_shared_count() {
        let db = setup_org_db().await;
        for id in ["m-1", "m-2", "m-3"] {
            insert_entry_with_quota(&db, &make_entry(id, "acme/eng")).await.unwrap();
        }

        let pg = upsert_entity(&db, "acme", "postgresql", "technology", 0.8).await.unwrap();
        let redis = upsert_entity(&db, "acme", "redis", "technology", 0.8).await.unwrap();

        // m-2 shares two entities with m-1, m-3 shares one.
        link_entity(&db, "m-1", pg).await.unwrap();
        link_entity(&db, "m-1", redis).await.unwrap();
        link_entity(&db, "m-2", pg).await.unwrap();
        link_entity(&db, "m-2", redis).await.unwrap();
        link_entity(&db, "m-3", pg).await.unwrap();

        let ids = co_occurring_entries(&db, "m-1", 10).await.unwrap();
        assert_eq!(ids, vec!["m-2".to_string(), "m-3".to_string()]);
    }

    #[tokio::test]
    async fn co_occurrence_excludes_non_latest() {
        let db = setup_org_db().await;
        insert_entry_with_quota(&db, &make_entry("m-1", "acme/eng")).await.unwrap();
        insert_entry_with_quota(&db, &make_entry("m-2", "acme/eng")).await.unwrap();

        let pg = upsert_entity(&db, "acme", "postgresql", "technology", 0.8).await.unwrap();
        link_entity(&db, "m-1", pg).await.unwrap();
        link_entity(&db, "m-2", pg).await.unwrap();

        crate::queries::entries::soft_delete(&db, "m-2").await.unwrap();

        let ids = co_occurring_entries(&db, "m-1", 10).await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn link_is_idempotent() {
        let db = setup_org_db().await;
        insert_entry_with_quota(&db, &make_entry("m-1", "acme/eng")).await.unwrap();
        let pg = upsert_entity(&db, "acme", "postgresql", "technology", 0.8).await.unwrap();

        link_entity(&db, "m-1", pg).await.unwrap();
        link_entity(&db, "m-1", pg).await.unwrap();

        let tags = entities_for_entry(&db, "m-1").await.unwrap();
        assert_eq!(tags.len(), 1);
    }
}
