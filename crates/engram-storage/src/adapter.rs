// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference adapter implementations backed by the SQLite store.
//!
//! `SqliteTaskQueue` and `SqliteQuota` are the in-process implementations
//! of the abstract queue and quota contracts. Both are thin wrappers over
//! the query modules so external deployments can swap in remote services.

use async_trait::async_trait;

use engram_core::traits::{PluginAdapter, QuotaAdapter, TaskQueueAdapter};
use engram_core::types::{AdapterType, HealthStatus, JobOptions, QuotaStatus};
use engram_core::EngramError;

use crate::database::Database;
use crate::queries;

/// Task queue adapter backed by the `task_queue` table.
#[derive(Clone)]
pub struct SqliteTaskQueue {
    db: Database,
}

impl SqliteTaskQueue {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PluginAdapter for SqliteTaskQueue {
    fn name(&self) -> &str {
        "sqlite-task-queue"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Queue
    }

    async fn health_check(&self) -> Result<HealthStatus, EngramError> {
        match queries::queue::depth(&self.db, "post_process").await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), EngramError> {
        Ok(())
    }
}

#[async_trait]
impl TaskQueueAdapter for SqliteTaskQueue {
    async fn enqueue(
        &self,
        queue_name: &str,
        payload: &str,
        options: JobOptions,
    ) -> Result<i64, EngramError> {
        queries::queue::enqueue(&self.db, queue_name, payload, options).await
    }
}

/// Quota adapter backed by the `organizations` table.
#[derive(Clone)]
pub struct SqliteQuota {
    db: Database,
}

impl SqliteQuota {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PluginAdapter for SqliteQuota {
    fn name(&self) -> &str {
        "sqlite-quota"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Quota
    }

    async fn health_check(&self) -> Result<HealthStatus, EngramError> {
        match queries::orgs::list_org_ids(&self.db).await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), EngramError> {
        Ok(())
    }
}

#[async_trait]
impl QuotaAdapter for SqliteQuota {
    async fn quota(&self, org_id: &str) -> Result<QuotaStatus, EngramError> {
        queries::orgs::quota(&self.db, org_id).await
    }
}
