// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for generative-model integrations.

use async_trait::async_trait;

use crate::error::EngramError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ProviderRequest, ProviderResponse};

/// Adapter for generative-model providers.
///
/// The memory core uses one-shot completions for entity extraction,
/// relation inference, semantic contradiction checks, and conflict
/// arbitration. Every model-based path has a rule-based fallback, so a
/// provider is always optional.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, EngramError>;
}
