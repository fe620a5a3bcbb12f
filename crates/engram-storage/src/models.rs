// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the domain types in `engram-core`,
//! plus storage-local structs for rows that never leave this layer.

use engram_core::types::{
    blob_to_vec, ConflictStatus, ConflictType, ContentType, EntityTag, InferredBy,
    MemoryConflict, MemoryEntry, MemoryPolicy, MemoryRelation, MemoryType, PolicyType,
    PoolType, RelationType,
};

/// An organization row with quota counters.
#[derive(Debug, Clone)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub quota_max: i64,
    pub quota_used: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// A task queue row.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub queue_name: String,
    pub payload: String,
    pub status: String,
    pub priority: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub run_after: String,
    pub backoff_base_secs: i64,
    pub locked_until: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Scope filter applied when loading embeddings for vector search.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingFilter {
    pub org_id: Option<String>,
    /// Exact namespace or subtree prefix (`ns` matches `ns` and `ns/...`).
    pub namespace: Option<String>,
    pub pool_type: Option<PoolType>,
    pub agent_id: Option<String>,
    pub department: Option<String>,
    pub content_type: Option<ContentType>,
}

/// Column list for `memory_entries` selects, kept in one place so every
/// query module maps rows identically.
pub const ENTRY_COLUMNS: &str = "id, org_id, namespace, content_type, content, embedding, \
     metadata, confidence, reputation, usage_count, validation_count, version, parent_id, \
     root_id, is_latest, memory_type, pool_type, department, agent_id, claim_key, \
     claim_value, archived, created_at, updated_at, accessed_at, expires_at, decay_factor, \
     decay_checkpoint";

/// Map a `memory_entries` row (selected via [`ENTRY_COLUMNS`]) to a domain entry.
pub fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<MemoryEntry> {
    let embedding_blob: Option<Vec<u8>> = row.get(5)?;
    let metadata_raw: String = row.get(6)?;
    let content_type_raw: String = row.get(3)?;
    let memory_type_raw: Option<String> = row.get(15)?;
    let pool_type_raw: String = row.get(16)?;

    Ok(MemoryEntry {
        id: row.get(0)?,
        org_id: row.get(1)?,
        namespace: row.get(2)?,
        content_type: ContentType::from_str_value(&content_type_raw),
        content: row.get(4)?,
        embedding: embedding_blob.map(|blob| blob_to_vec(&blob)),
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null),
        confidence: row.get(7)?,
        reputation: row.get(8)?,
        usage_count: row.get(9)?,
        validation_count: row.get(10)?,
        version: row.get(11)?,
        parent_id: row.get(12)?,
        root_id: row.get(13)?,
        is_latest: row.get::<_, i64>(14)? != 0,
        memory_type: memory_type_raw.as_deref().and_then(MemoryType::from_str_value),
        pool_type: PoolType::from_str_value(&pool_type_raw),
        department: row.get(17)?,
        agent_id: row.get(18)?,
        claim_key: row.get(19)?,
        claim_value: row.get(20)?,
        archived: row.get::<_, i64>(21)? != 0,
        created_at: row.get(22)?,
        updated_at: row.get(23)?,
        accessed_at: row.get(24)?,
        expires_at: row.get(25)?,
        decay_factor: row.get(26)?,
        decay_checkpoint: row.get(27)?,
    })
}

/// Column list for `memory_relations` selects.
pub const RELATION_COLUMNS: &str =
    "id, source_id, target_id, relation_type, strength, reason, inferred_by, created_at";

/// Map a `memory_relations` row to a domain relation.
///
/// Rows with an unknown relation type string are surfaced as
/// `SIMILAR_TO` rather than failing the whole query; the type set only
/// grows, so this covers forward-compat reads.
pub fn relation_from_row(row: &rusqlite::Row) -> rusqlite::Result<MemoryRelation> {
    let relation_type_raw: String = row.get(3)?;
    let inferred_by_raw: String = row.get(6)?;
    Ok(MemoryRelation {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        relation_type: RelationType::from_str_value(&relation_type_raw)
            .unwrap_or(RelationType::SimilarTo),
        strength: row.get(4)?,
        reason: row.get(5)?,
        inferred_by: InferredBy::from_str_value(&inferred_by_raw),
        created_at: row.get(7)?,
    })
}

/// Column list for `memory_conflicts` selects.
pub const CONFLICT_COLUMNS: &str = "id, org_id, first_id, second_id, conflict_type, status, \
     winning_id, resolved_by, explanation, created_at, resolved_at";

/// Map a `memory_conflicts` row to a domain conflict.
pub fn conflict_from_row(row: &rusqlite::Row) -> rusqlite::Result<MemoryConflict> {
    let conflict_type_raw: String = row.get(4)?;
    let status_raw: String = row.get(5)?;
    Ok(MemoryConflict {
        id: row.get(0)?,
        org_id: row.get(1)?,
        first_id: row.get(2)?,
        second_id: row.get(3)?,
        conflict_type: ConflictType::from_str_value(&conflict_type_raw),
        status: ConflictStatus::from_str_value(&status_raw),
        winning_id: row.get(6)?,
        resolved_by: row.get(7)?,
        explanation: row.get(8)?,
        created_at: row.get(9)?,
        resolved_at: row.get(10)?,
    })
}

/// Column list for `memory_policies` selects.
pub const POLICY_COLUMNS: &str =
    "id, org_id, namespace, policy_type, rules, created_at, updated_at";

/// Map a `memory_policies` row to a domain policy.
pub fn policy_from_row(row: &rusqlite::Row) -> rusqlite::Result<MemoryPolicy> {
    let policy_type_raw: String = row.get(3)?;
    let rules_raw: String = row.get(4)?;
    Ok(MemoryPolicy {
        id: row.get(0)?,
        org_id: row.get(1)?,
        namespace: row.get(2)?,
        policy_type: PolicyType::from_str_value(&policy_type_raw)
            .unwrap_or(PolicyType::Retention),
        rules: serde_json::from_str(&rules_raw).unwrap_or(serde_json::Value::Null),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Map an `entity_tags` row to a domain tag.
pub fn entity_from_row(row: &rusqlite::Row) -> rusqlite::Result<EntityTag> {
    Ok(EntityTag {
        id: row.get(0)?,
        org_id: row.get(1)?,
        name: row.get(2)?,
        entity_type: row.get(3)?,
        mention_count: row.get(4)?,
        confidence: row.get(5)?,
    })
}
