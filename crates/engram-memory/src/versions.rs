// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Version chains: immutable history with a movable latest pointer.
//!
//! Every content change is a new row linked by `parent_id`; `root_id` is
//! stored on every row so chain loads are one indexed query instead of a
//! parent-pointer walk. Rollback only moves the `is_latest` pointer.

use engram_core::types::{now_iso, MemoryEntry};
use engram_core::EngramError;
use engram_storage::{queries, Database};
use tracing::debug;
use uuid::Uuid;

/// Fields an update may change. Everything else is inherited from the
/// parent version.
#[derive(Debug, Clone, Default)]
pub struct VersionPatch {
    pub content: Option<String>,
    pub confidence: Option<f64>,
    pub metadata: Option<serde_json::Value>,
    pub claim_key: Option<Option<String>>,
    pub claim_value: Option<Option<String>>,
}

impl VersionPatch {
    /// Whether applying this patch to `parent` would change the content
    /// (and therefore require a fresh embedding).
    pub fn changes_content(&self, parent: &MemoryEntry) -> bool {
        self.content.as_ref().is_some_and(|c| *c != parent.content)
    }
}

/// One node of a version tree.
#[derive(Debug, Clone)]
pub struct VersionNode {
    pub entry: MemoryEntry,
    pub children: Vec<VersionNode>,
}

/// Field-level difference between two versions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionDiff {
    pub content_changed: bool,
    pub confidence_delta: f64,
    pub metadata_added: Vec<String>,
    pub metadata_removed: Vec<String>,
    pub metadata_changed: Vec<String>,
}

/// Build / roll back / diff / archive version chains.
#[derive(Clone)]
pub struct VersionManager {
    db: Database,
}

impl VersionManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new version under `parent_id`, which must currently be the
    /// latest row of its chain.
    ///
    /// Usage and validation counters reset; reputation and scoping are
    /// inherited; the decay clock restarts. `embedding` is the fresh
    /// vector when the patch changed the content, `None` to inherit.
    /// Returns the new entry and ids of any claim conflicts it triggered.
    pub async fn create_version(
        &self,
        parent_id: &str,
        patch: VersionPatch,
        author: &str,
        embedding: Option<Vec<f32>>,
    ) -> Result<(MemoryEntry, Vec<String>), EngramError> {
        let parent = queries::entries::get_entry(&self.db, parent_id)
            .await?
            .ok_or_else(|| EngramError::NotFound {
                kind: "memory",
                id: parent_id.to_string(),
            })?;
        if !parent.is_latest {
            return Err(EngramError::NotFound {
                kind: "latest version",
                id: parent_id.to_string(),
            });
        }

        let now = now_iso();
        let new_entry = MemoryEntry {
            id: Uuid::now_v7().to_string(),
            org_id: parent.org_id.clone(),
            namespace: parent.namespace.clone(),
            content_type: parent.content_type,
            content: patch.content.clone().unwrap_or_else(|| parent.content.clone()),
            embedding: embedding.or_else(|| parent.embedding.clone()),
            metadata: patch.metadata.clone().unwrap_or_else(|| parent.metadata.clone()),
            confidence: patch
                .confidence
                .unwrap_or(parent.confidence)
                .clamp(0.0, 1.0),
            reputation: parent.reputation,
            usage_count: 0,
            validation_count: 0,
            version: parent.version + 1,
            parent_id: Some(parent.id.clone()),
            root_id: parent.root_id.clone(),
            is_latest: true,
            memory_type: parent.memory_type,
            pool_type: parent.pool_type,
            department: parent.department.clone(),
            agent_id: Some(author.to_string()),
            claim_key: patch.claim_key.clone().unwrap_or_else(|| parent.claim_key.clone()),
            claim_value: patch
                .claim_value
                .clone()
                .unwrap_or_else(|| parent.claim_value.clone()),
            archived: false,
            created_at: now.clone(),
            updated_at: now.clone(),
            accessed_at: now.clone(),
            expires_at: None,
            decay_factor: parent.decay_factor,
            decay_checkpoint: now,
        };

        let conflict_ids = queries::entries::insert_version(&self.db, &new_entry).await?;
        debug!(
            parent = parent.id,
            version = new_entry.version,
            id = new_entry.id,
            "created version"
        );
        Ok((new_entry, conflict_ids))
    }

    /// The full version tree of the chain containing `id`, rooted at the
    /// version-1 row.
    pub async fn version_tree(&self, id: &str) -> Result<VersionNode, EngramError> {
        let chain = self.chain_of(id).await?;

        // Group children by parent, then rebuild the tree from the root.
        let mut children_of: std::collections::HashMap<String, Vec<MemoryEntry>> =
            std::collections::HashMap::new();
        let mut root: Option<MemoryEntry> = None;
        let ids: std::collections::HashSet<&str> =
            chain.iter().map(|e| e.id.as_str()).collect();

        for entry in chain.iter() {
            match &entry.parent_id {
                Some(parent) if ids.contains(parent.as_str()) => {
                    children_of.entry(parent.clone()).or_default().push(entry.clone());
                }
                _ => root = Some(entry.clone()),
            }
        }

        let root = root.ok_or_else(|| EngramError::Internal(format!(
            "version chain of {id} has no root"
        )))?;
        Ok(build_node(root, &mut children_of))
    }

    /// Chain history, oldest version first.
    pub async fn history(&self, id: &str) -> Result<Vec<MemoryEntry>, EngramError> {
        self.chain_of(id).await
    }

    /// Move the latest pointer of the chain containing `id` to
    /// `target_version`. History is never deleted or mutated.
    pub async fn rollback(
        &self,
        id: &str,
        target_version: i64,
    ) -> Result<MemoryEntry, EngramError> {
        let chain = self.chain_of(id).await?;
        let target = chain
            .iter()
            .find(|e| e.version == target_version)
            .ok_or_else(|| EngramError::NotFound {
                kind: "version",
                id: format!("{id}@v{target_version}"),
            })?
            .clone();

        queries::entries::rollback_latest(&self.db, &target.root_id, &target.id).await?;
        debug!(root = target.root_id, version = target_version, "rolled back");
        Ok(target)
    }

    /// Field-level diff between two versions (any two entries).
    pub async fn compare_versions(&self, a: &str, b: &str) -> Result<VersionDiff, EngramError> {
        let first = self.must_get(a).await?;
        let second = self.must_get(b).await?;
        Ok(diff_entries(&first, &second))
    }

    /// Demote all but the `keep` most recent versions of the chain
    /// containing `id` to the archived state. Returns how many rows were
    /// demoted. Nothing is deleted.
    pub async fn archive_old_versions(&self, id: &str, keep: usize) -> Result<usize, EngramError> {
        let entry = self.must_get(id).await?;
        queries::entries::mark_old_versions_archived(&self.db, &entry.root_id, keep).await
    }

    async fn chain_of(&self, id: &str) -> Result<Vec<MemoryEntry>, EngramError> {
        let entry = self.must_get(id).await?;
        queries::entries::chain_entries(&self.db, &entry.root_id).await
    }

    async fn must_get(&self, id: &str) -> Result<MemoryEntry, EngramError> {
        queries::entries::get_entry(&self.db, id)
            .await?
            .ok_or_else(|| EngramError::NotFound {
                kind: "memory",
                id: id.to_string(),
            })
    }
}

fn build_node(
    entry: MemoryEntry,
    children_of: &mut std::collections::HashMap<String, Vec<MemoryEntry>>,
) -> VersionNode {
    let mut children: Vec<VersionNode> = children_of
        .remove(&entry.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| build_node(child, children_of))
        .collect();
    children.sort_by_key(|node| node.entry.version);
    VersionNode { entry, children }
}

/// Compare content, confidence, and metadata keys of two entries.
pub fn diff_entries(a: &MemoryEntry, b: &MemoryEntry) -> VersionDiff {
    let empty = serde_json::Map::new();
    let a_map = a.metadata.as_object().unwrap_or(&empty);
    let b_map = b.metadata.as_object().unwrap_or(&empty);

    let mut added: Vec<String> = b_map.keys().filter(|k| !a_map.contains_key(*k)).cloned().collect();
    let mut removed: Vec<String> =
        a_map.keys().filter(|k| !b_map.contains_key(*k)).cloned().collect();
    let mut changed: Vec<String> = a_map
        .iter()
        .filter(|(k, v)| b_map.get(*k).is_some_and(|other| other != *v))
        .map(|(k, _)| k.clone())
        .collect();
    added.sort();
    removed.sort();
    changed.sort();

    VersionDiff {
        content_changed: a.content != b.content,
        confidence_delta: b.confidence - a.confidence,
        metadata_added: added,
        metadata_removed: removed,
        metadata_changed: changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_test_utils::harness::{insert_seeded_entry, seeded_db};

    async fn manager() -> (VersionManager, Database) {
        let db = seeded_db().await;
        (VersionManager::new(db.clone()), db)
    }

    #[tokio::test]
    async fn create_version_inherits_and_resets() {
        let (manager, db) = manager().await;
        insert_seeded_entry(&db, "m-1", "acme/eng", vec![0.1; 4]).await;

        // Give the parent some history to prove counters reset.
        queries::entries::bump_access(&db, &["m-1".to_string()]).await.unwrap();
        queries::entries::record_validation(&db, "m-1").await.unwrap();

        let patch = VersionPatch {
            content: Some("revised".to_string()),
            confidence: Some(0.95),
            ..VersionPatch::default()
        };
        let (v2, _) = manager
            .create_version("m-1", patch, "agent-2", Some(vec![0.2; 4]))
            .await
            .unwrap();

        assert_eq!(v2.version, 2);
        assert_eq!(v2.parent_id.as_deref(), Some("m-1"));
        assert_eq!(v2.root_id, "m-1");
        assert_eq!(v2.content, "revised");
        assert_eq!(v2.usage_count, 0);
        assert_eq!(v2.validation_count, 0);
        assert_eq!(v2.agent_id.as_deref(), Some("agent-2"));
        assert!(v2.is_latest);

        let parent = queries::entries::get_entry(&db, "m-1").await.unwrap().unwrap();
        assert!(!parent.is_latest);
    }

    #[tokio::test]
    async fn create_version_rejects_stale_parent() {
        let (manager, db) = manager().await;
        insert_seeded_entry(&db, "m-1", "acme/eng", vec![0.1; 4]).await;

        manager
            .create_version("m-1", VersionPatch::default(), "agent-1", None)
            .await
            .unwrap();

        // The original row is no longer latest; branching from it fails.
        let err = manager
            .create_version("m-1", VersionPatch::default(), "agent-1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::NotFound { .. }));
    }

    #[tokio::test]
    async fn exactly_one_latest_through_version_and_rollback() {
        let (manager, db) = manager().await;
        insert_seeded_entry(&db, "m-1", "acme/eng", vec![0.1; 4]).await;

        let (v2, _) = manager
            .create_version("m-1", VersionPatch::default(), "agent-1", None)
            .await
            .unwrap();
        let (_v3, _) = manager
            .create_version(&v2.id, VersionPatch::default(), "agent-1", None)
            .await
            .unwrap();

        let latest_count = |chain: &[MemoryEntry]| chain.iter().filter(|e| e.is_latest).count();

        let chain = manager.history("m-1").await.unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(latest_count(&chain), 1);

        let target = manager.rollback("m-1", 1).await.unwrap();
        assert_eq!(target.id, "m-1");

        let chain = manager.history("m-1").await.unwrap();
        assert_eq!(chain.len(), 3, "rollback must not delete history");
        assert_eq!(latest_count(&chain), 1);
        assert!(chain.iter().find(|e| e.version == 1).unwrap().is_latest);

        let _ = db;
    }

    #[tokio::test]
    async fn rollback_to_missing_version_fails() {
        let (manager, db) = manager().await;
        insert_seeded_entry(&db, "m-1", "acme/eng", vec![0.1; 4]).await;

        let err = manager.rollback("m-1", 7).await.unwrap_err();
        assert!(matches!(err, EngramError::NotFound { .. }));
    }

    #[tokio::test]
    async fn tree_follows_rollback_branching() {
        let (manager, db) = manager().await;
        insert_seeded_entry(&db, "m-1", "acme/eng", vec![0.1; 4]).await;

        let (v2, _) = manager
            .create_version("m-1", VersionPatch::default(), "agent-1", None)
            .await
            .unwrap();

        // Roll back to v1 and branch again: v1 gets two children.
        manager.rollback("m-1", 1).await.unwrap();
        let (_v2b, _) = manager
            .create_version("m-1", VersionPatch::default(), "agent-1", None)
            .await
            .unwrap();

        let tree = manager.version_tree("m-1").await.unwrap();
        assert_eq!(tree.entry.id, "m-1");
        assert_eq!(tree.children.len(), 2);
        assert!(tree.children.iter().any(|n| n.entry.id == v2.id));
    }

    #[tokio::test]
    async fn diff_reports_field_changes() {
        let a = {
            let mut e = engram_test_utils::harness::make_entry("a", "acme/eng");
            e.content = "old".to_string();
            e.confidence = 0.5;
            e.metadata = serde_json::json!({"keep": 1, "drop": 1, "edit": "x"});
            e
        };
        let b = {
            let mut e = engram_test_utils::harness::make_entry("b", "acme/eng");
            e.content = "new".to_string();
            e.confidence = 0.8;
            e.metadata = serde_json::json!({"keep": 1, "edit": "y", "fresh": true});
            e
        };

        let diff = diff_entries(&a, &b);
        assert!(diff.content_changed);
        assert!((diff.confidence_delta - 0.3).abs() < 1e-9);
        assert_eq!(diff.metadata_added, vec!["fresh"]);
        assert_eq!(diff.metadata_removed, vec!["drop"]);
        assert_eq!(diff.metadata_changed, vec!["edit"]);
    }

    #[tokio::test]
    async fn archive_old_versions_demotes_history() {
        let (manager, db) = manager().await;
        insert_seeded_entry(&db, "m-1", "acme/eng", vec![0.1; 4]).await;

        let mut latest = "m-1".to_string();
        for _ in 0..3 {
            let (v, _) = manager
                .create_version(&latest, VersionPatch::default(), "agent-1", None)
                .await
                .unwrap();
            latest = v.id;
        }

        let demoted = manager.archive_old_versions(&latest, 2).await.unwrap();
        assert_eq!(demoted, 2);

        let chain = manager.history(&latest).await.unwrap();
        let archived: Vec<i64> =
            chain.iter().filter(|e| e.archived).map(|e| e.version).collect();
        assert_eq!(archived, vec![1, 2]);
    }
}
