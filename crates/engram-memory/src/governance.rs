// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Governance: retention, access, and conflict-resolution policies.
//!
//! Policy lookups are cached process-locally with a short TTL (including
//! negative results), so reads are eventually consistent within the TTL.
//! Every policy mutation in this module invalidates the affected cache
//! slice; external writers must call `invalidate` themselves.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use engram_core::types::{
    AccessOp, AccessRules, ConflictRules, MemoryPolicy, PolicyType, RetentionRules,
};
use engram_core::EngramError;
use engram_config::model::GovernanceConfig;
use engram_storage::{queries, Database};
use tracing::{debug, info, warn};

use crate::conflicts::ResolutionStrategy;

/// What a retention sweep did (or would have done) for one organization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub expired_by_age: usize,
    pub trimmed_by_count: usize,
    /// Breaches observed under `expire_on_breach = false` policies.
    pub logged_only: usize,
}

struct CachedPolicy {
    policy: Option<MemoryPolicy>,
    fetched_at: Instant,
}

/// Policy enforcement with a TTL cache.
pub struct GovernanceService {
    db: Database,
    cache: DashMap<(String, String, PolicyType), CachedPolicy>,
    ttl: Duration,
}

impl GovernanceService {
    pub fn new(db: Database, config: &GovernanceConfig) -> Self {
        Self {
            db,
            cache: DashMap::new(),
            ttl: Duration::from_secs(config.policy_cache_ttl_secs),
        }
    }

    /// Cached exact (org, namespace, type) lookup. Negative results are
    /// cached too.
    pub async fn lookup(
        &self,
        org_id: &str,
        namespace: &str,
        policy_type: PolicyType,
    ) -> Result<Option<MemoryPolicy>, EngramError> {
        let key = (org_id.to_string(), namespace.to_string(), policy_type);
        if let Some(cached) = self.cache.get(&key) {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.policy.clone());
            }
        }

        let policy = queries::policies::get_policy(&self.db, org_id, namespace, policy_type).await?;
        self.cache.insert(
            key,
            CachedPolicy {
                policy: policy.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(policy)
    }

    /// The policy governing a namespace: the namespace's own policy, or
    /// the nearest ancestor's.
    pub async fn effective_policy(
        &self,
        org_id: &str,
        namespace: &str,
        policy_type: PolicyType,
    ) -> Result<Option<MemoryPolicy>, EngramError> {
        let mut scope = namespace;
        loop {
            if let Some(policy) = self.lookup(org_id, scope, policy_type).await? {
                return Ok(Some(policy));
            }
            match scope.rfind('/') {
                Some(idx) => scope = &scope[..idx],
                None => return Ok(None),
            }
        }
    }

    /// Drop cached policies for an organization, optionally only below a
    /// namespace subtree. Must be called after any out-of-band policy
    /// mutation.
    pub fn invalidate(&self, org_id: &str, namespace: Option<&str>) {
        self.cache.retain(|(org, ns, _), _| {
            if org != org_id {
                return true;
            }
            match namespace {
                Some(prefix) => !(ns == prefix || ns.starts_with(&format!("{prefix}/"))),
                None => false,
            }
        });
        debug!(org_id, ?namespace, "policy cache invalidated");
    }

    /// Store (or replace) a policy and invalidate its cache slice.
    pub async fn set_policy(
        &self,
        org_id: &str,
        namespace: &str,
        policy_type: PolicyType,
        rules: &serde_json::Value,
    ) -> Result<String, EngramError> {
        let id = queries::policies::upsert_policy(&self.db, org_id, namespace, policy_type, rules)
            .await?;
        self.invalidate(org_id, Some(namespace));
        Ok(id)
    }

    /// Delete a policy and invalidate its cache slice.
    pub async fn remove_policy(
        &self,
        org_id: &str,
        namespace: &str,
        policy_type: PolicyType,
    ) -> Result<bool, EngramError> {
        let deleted =
            queries::policies::delete_policy(&self.db, org_id, namespace, policy_type).await?;
        self.invalidate(org_id, Some(namespace));
        Ok(deleted)
    }

    /// Enforce the access policy for an operation. Open by default: no
    /// policy means allowed.
    pub async fn check_access(
        &self,
        org_id: &str,
        namespace: &str,
        agent_id: Option<&str>,
        op: AccessOp,
    ) -> Result<(), EngramError> {
        let Some(policy) = self
            .effective_policy(org_id, namespace, PolicyType::Access)
            .await?
        else {
            return Ok(());
        };

        let rules: AccessRules = serde_json::from_value(policy.rules.clone()).unwrap_or_default();

        if rules.deny_all {
            return Err(EngramError::AccessDenied {
                reason: format!("namespace {namespace} denies all access"),
            });
        }
        if rules.read_only && op.is_write() {
            return Err(EngramError::AccessDenied {
                reason: format!("namespace {namespace} is read-only"),
            });
        }
        if !rules.allowed_agents.is_empty() {
            let allowed = agent_id.is_some_and(|agent| {
                rules.allowed_agents.iter().any(|a| a == agent)
            });
            if !allowed {
                return Err(EngramError::AccessDenied {
                    reason: format!(
                        "agent {} is not on the allow-list for {namespace}",
                        agent_id.unwrap_or("<anonymous>")
                    ),
                });
            }
        }
        Ok(())
    }

    /// Apply every retention policy of an organization. Idempotent and
    /// row-scoped, safe to run from concurrent workers.
    pub async fn enforce_retention(&self, org_id: &str) -> Result<RetentionReport, EngramError> {
        let policies =
            queries::policies::list_policies(&self.db, org_id, Some(PolicyType::Retention)).await?;
        let mut report = RetentionReport::default();

        for policy in policies {
            let rules: RetentionRules =
                serde_json::from_value(policy.rules.clone()).unwrap_or_default();
            let enforce = rules.expire_on_breach();

            if let Some(max_age) = rules.max_age_seconds {
                let cutoff = (chrono::Utc::now() - chrono::Duration::seconds(max_age))
                    .format("%Y-%m-%dT%H:%M:%S%.3fZ")
                    .to_string();
                if enforce {
                    report.expired_by_age += queries::entries::expire_older_than(
                        &self.db,
                        org_id,
                        &policy.namespace,
                        &cutoff,
                    )
                    .await?;
                } else {
                    let breaches = queries::entries::count_older_than(
                        &self.db,
                        org_id,
                        &policy.namespace,
                        &cutoff,
                    )
                    .await? as usize;
                    if breaches > 0 {
                        warn!(
                            org_id,
                            namespace = policy.namespace,
                            breaches,
                            "retention age breach (log-only policy)"
                        );
                        report.logged_only += breaches;
                    }
                }
            }

            if let Some(max_count) = rules.max_count {
                let max_count = max_count.max(0) as usize;
                if enforce {
                    report.trimmed_by_count += queries::entries::trim_to_count(
                        &self.db,
                        org_id,
                        &policy.namespace,
                        max_count,
                    )
                    .await?;
                } else {
                    let live = queries::entries::count_in_namespace(
                        &self.db,
                        org_id,
                        &policy.namespace,
                    )
                    .await? as usize;
                    if live > max_count {
                        warn!(
                            org_id,
                            namespace = policy.namespace,
                            over = live - max_count,
                            "retention count breach (log-only policy)"
                        );
                        report.logged_only += live - max_count;
                    }
                }
            }
        }

        if report.expired_by_age + report.trimmed_by_count > 0 {
            info!(
                org_id,
                expired = report.expired_by_age,
                trimmed = report.trimmed_by_count,
                "retention enforced"
            );
        }
        Ok(report)
    }

    /// The conflict-resolution strategy configured for a namespace.
    /// Defaults to score-wins when no policy exists.
    pub async fn resolution_strategy(
        &self,
        org_id: &str,
        namespace: &str,
    ) -> Result<ResolutionStrategy, EngramError> {
        let Some(policy) = self
            .effective_policy(org_id, namespace, PolicyType::ConflictResolution)
            .await?
        else {
            return Ok(ResolutionStrategy::ScoreWins);
        };
        let rules: ConflictRules = serde_json::from_value(policy.rules.clone()).unwrap_or_default();
        Ok(rules
            .strategy
            .as_deref()
            .and_then(ResolutionStrategy::from_str_value)
            .unwrap_or(ResolutionStrategy::ScoreWins))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_test_utils::harness::{make_entry, seeded_db};

    fn governance(db: Database) -> GovernanceService {
        GovernanceService::new(db, &GovernanceConfig::default())
    }

    #[tokio::test]
    async fn access_is_open_by_default() {
        let db = seeded_db().await;
        let gov = governance(db);
        gov.check_access("acme", "acme/eng", Some("agent-1"), AccessOp::Create)
            .await
            .unwrap();
        gov.check_access("acme", "acme/eng", None, AccessOp::Read).await.unwrap();
    }

    #[tokio::test]
    async fn deny_all_blocks_everything() {
        let db = seeded_db().await;
        let gov = governance(db);
        gov.set_policy(
            "acme",
            "acme/vault",
            PolicyType::Access,
            &serde_json::json!({"deny_all": true}),
        )
        .await
        .unwrap();

        let err = gov
            .check_access("acme", "acme/vault", Some("agent-1"), AccessOp::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn read_only_blocks_writes_not_reads() {
        let db = seeded_db().await;
        let gov = governance(db);
        gov.set_policy(
            "acme",
            "acme/ref",
            PolicyType::Access,
            &serde_json::json!({"read_only": true}),
        )
        .await
        .unwrap();

        gov.check_access("acme", "acme/ref", Some("agent-1"), AccessOp::Read)
            .await
            .unwrap();
        let err = gov
            .check_access("acme", "acme/ref", Some("agent-1"), AccessOp::Update)
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn allow_list_gates_agents() {
        let db = seeded_db().await;
        let gov = governance(db);
        gov.set_policy(
            "acme",
            "acme/eng",
            PolicyType::Access,
            &serde_json::json!({"allowed_agents": ["agent-1"]}),
        )
        .await
        .unwrap();

        gov.check_access("acme", "acme/eng", Some("agent-1"), AccessOp::Create)
            .await
            .unwrap();
        assert!(gov
            .check_access("acme", "acme/eng", Some("agent-2"), AccessOp::Create)
            .await
            .is_err());
        assert!(gov
            .check_access("acme", "acme/eng", None, AccessOp::Create)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn ancestor_policy_governs_subtree() {
        let db = seeded_db().await;
        let gov = governance(db);
        gov.set_policy(
            "acme",
            "acme/eng",
            PolicyType::Access,
            &serde_json::json!({"read_only": true}),
        )
        .await
        .unwrap();

        let err = gov
            .check_access("acme", "acme/eng/build/cache", Some("agent-1"), AccessOp::Delete)
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::AccessDenied { .. }));
    }

    #[tokio::test]
    async fn cache_serves_until_invalidated() {
        let db = seeded_db().await;
        let gov = governance(db.clone());

        // Prime the (negative) cache.
        assert!(gov.lookup("acme", "acme/eng", PolicyType::Access).await.unwrap().is_none());

        // Write the policy behind the cache's back.
        queries::policies::upsert_policy(
            &db,
            "acme",
            "acme/eng",
            PolicyType::Access,
            &serde_json::json!({"deny_all": true}),
        )
        .await
        .unwrap();

        // Still cached: stale negative result within TTL.
        assert!(gov.lookup("acme", "acme/eng", PolicyType::Access).await.unwrap().is_none());

        gov.invalidate("acme", Some("acme/eng"));
        assert!(gov.lookup("acme", "acme/eng", PolicyType::Access).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn invalidate_scopes_to_namespace_subtree() {
        let db = seeded_db().await;
        let gov = governance(db.clone());

        gov.set_policy("acme", "acme/eng", PolicyType::Access, &serde_json::json!({}))
            .await
            .unwrap();
        gov.lookup("acme", "acme/eng", PolicyType::Access).await.unwrap();
        gov.lookup("acme", "acme/sales", PolicyType::Access).await.unwrap();

        gov.invalidate("acme", Some("acme/eng"));
        assert!(!gov.cache.contains_key(&(
            "acme".to_string(),
            "acme/eng".to_string(),
            PolicyType::Access
        )));
        assert!(gov.cache.contains_key(&(
            "acme".to_string(),
            "acme/sales".to_string(),
            PolicyType::Access
        )));
    }

    #[tokio::test]
    async fn retention_max_count_trims_oldest() {
        let db = seeded_db().await;
        let gov = governance(db.clone());

        for i in 0..5 {
            let mut entry = make_entry(&format!("m-{i}"), "acme/eng");
            entry.created_at = format!("2026-01-0{}T00:00:00.000Z", i + 1);
            queries::entries::insert_entry_with_quota(&db, &entry).await.unwrap();
        }
        gov.set_policy(
            "acme",
            "acme/eng",
            PolicyType::Retention,
            &serde_json::json!({"max_count": 3}),
        )
        .await
        .unwrap();

        let report = gov.enforce_retention("acme").await.unwrap();
        assert_eq!(report.trimmed_by_count, 2);
        assert_eq!(
            queries::entries::count_in_namespace(&db, "acme", "acme/eng").await.unwrap(),
            3
        );

        // Idempotent.
        let report = gov.enforce_retention("acme").await.unwrap();
        assert_eq!(report.trimmed_by_count, 0);
    }

    #[tokio::test]
    async fn retention_max_age_expires_old_entries() {
        let db = seeded_db().await;
        let gov = governance(db.clone());

        let mut old = make_entry("old", "acme/eng");
        old.created_at = "2020-01-01T00:00:00.000Z".to_string();
        queries::entries::insert_entry_with_quota(&db, &old).await.unwrap();
        let fresh = make_entry("fresh", "acme/eng");
        queries::entries::insert_entry_with_quota(&db, &fresh).await.unwrap();

        gov.set_policy(
            "acme",
            "acme/eng",
            PolicyType::Retention,
            &serde_json::json!({"max_age_seconds": 86400}),
        )
        .await
        .unwrap();

        let report = gov.enforce_retention("acme").await.unwrap();
        assert_eq!(report.expired_by_age, 1);
        assert!(!queries::entries::get_entry(&db, "old").await.unwrap().unwrap().is_latest);
        assert!(queries::entries::get_entry(&db, "fresh").await.unwrap().unwrap().is_latest);
    }

    #[tokio::test]
    async fn log_only_policy_reports_without_expiring() {
        let db = seeded_db().await;
        let gov = governance(db.clone());

        let mut old = make_entry("old", "acme/eng");
        old.created_at = "2020-01-01T00:00:00.000Z".to_string();
        queries::entries::insert_entry_with_quota(&db, &old).await.unwrap();

        gov.set_policy(
            "acme",
            "acme/eng",
            PolicyType::Retention,
            &serde_json::json!({"max_age_seconds": 86400, "expire_on_breach": false}),
        )
        .await
        .unwrap();

        let report = gov.enforce_retention("acme").await.unwrap();
        assert_eq!(report.expired_by_age, 0);
        assert_eq!(report.logged_only, 1);
        assert!(queries::entries::get_entry(&db, "old").await.unwrap().unwrap().is_latest);
    }

    #[tokio::test]
    async fn resolution_strategy_defaults_to_score_wins() {
        let db = seeded_db().await;
        let gov = governance(db);
        assert_eq!(
            gov.resolution_strategy("acme", "acme/eng").await.unwrap(),
            ResolutionStrategy::ScoreWins
        );
    }

    #[tokio::test]
    async fn resolution_strategy_reads_policy() {
        let db = seeded_db().await;
        let gov = governance(db);
        gov.set_policy(
            "acme",
            "acme/eng",
            PolicyType::ConflictResolution,
            &serde_json::json!({"strategy": "latest-wins"}),
        )
        .await
        .unwrap();

        assert_eq!(
            gov.resolution_strategy("acme", "acme/eng").await.unwrap(),
            ResolutionStrategy::LatestWins
        );
    }
}
