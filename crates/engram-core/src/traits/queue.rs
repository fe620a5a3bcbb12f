// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task queue adapter trait for fire-and-forget background work.

use async_trait::async_trait;

use crate::error::EngramError;
use crate::traits::adapter::PluginAdapter;
use crate::types::JobOptions;

/// Adapter for enqueueing background jobs.
///
/// The write path enqueues post-processing (entity extraction, relation
/// building) and conflict arbitration here. Jobs reference only row ids,
/// decoupling the failure domain from the committed write: an enqueue
/// failure is logged by the caller and never fails the write.
#[async_trait]
pub trait TaskQueueAdapter: PluginAdapter {
    /// Enqueue a job payload on the named queue. Returns the job id.
    async fn enqueue(
        &self,
        queue_name: &str,
        payload: &str,
        options: JobOptions,
    ) -> Result<i64, EngramError>;
}
