// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quota adapter trait for organization-level write limits.

use async_trait::async_trait;

use crate::error::EngramError;
use crate::traits::adapter::PluginAdapter;
use crate::types::QuotaStatus;

/// Adapter for consulting organization memory quotas.
///
/// Consulted before every create. The quota counter itself is incremented
/// inside the entry-insert transaction by the storage layer, so the check
/// here is advisory; the transaction is the authority.
#[async_trait]
pub trait QuotaAdapter: PluginAdapter {
    /// Current quota state for the organization.
    async fn quota(&self, org_id: &str) -> Result<QuotaStatus, EngramError>;
}
