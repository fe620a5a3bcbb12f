// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database fixtures shared by integration-style tests.

use engram_core::types::{now_iso, ContentType, MemoryEntry, PoolType};
use engram_storage::{queries, Database};

/// In-memory database with the full schema and a seeded `acme`
/// organization (quota 1000).
pub async fn seeded_db() -> Database {
    let db = Database::open_in_memory().await.expect("in-memory db");
    queries::orgs::create_org(&db, "acme", "Acme", 1000)
        .await
        .expect("seed org");
    db
}

/// A minimal live entry rooted at its own id, owned by `acme`.
pub fn make_entry(id: &str, namespace: &str) -> MemoryEntry {
    let now = now_iso();
    MemoryEntry {
        id: id.to_string(),
        org_id: "acme".to_string(),
        namespace: namespace.to_string(),
        content_type: ContentType::Fact,
        content: format!("content of {id}"),
        embedding: None,
        metadata: serde_json::json!({}),
        confidence: 0.8,
        reputation: 50.0,
        usage_count: 0,
        validation_count: 0,
        version: 1,
        parent_id: None,
        root_id: id.to_string(),
        is_latest: true,
        memory_type: None,
        pool_type: PoolType::Global,
        department: None,
        agent_id: Some("agent-1".to_string()),
        claim_key: None,
        claim_value: None,
        archived: false,
        created_at: now.clone(),
        updated_at: now.clone(),
        accessed_at: now.clone(),
        expires_at: None,
        decay_factor: 0.01,
        decay_checkpoint: now,
    }
}

/// Insert an entry with the given embedding through the quota-coupled
/// write path.
pub async fn insert_seeded_entry(db: &Database, id: &str, namespace: &str, embedding: Vec<f32>) {
    let mut entry = make_entry(id, namespace);
    entry.embedding = Some(embedding);
    queries::entries::insert_entry_with_quota(db, &entry)
        .await
        .expect("insert entry");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_db_has_org_with_quota() {
        let db = seeded_db().await;
        let status = queries::orgs::quota(&db, "acme").await.unwrap();
        assert_eq!(status.max, 1000);
        assert_eq!(status.used, 0);
    }

    #[tokio::test]
    async fn seeded_entry_is_retrievable() {
        let db = seeded_db().await;
        insert_seeded_entry(&db, "m-1", "acme/eng", vec![0.5, 0.5]).await;
        let entry = queries::entries::get_entry(&db, "m-1").await.unwrap().unwrap();
        assert_eq!(entry.embedding.unwrap().len(), 2);
    }
}
