// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock model provider for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` with pre-configured
//! responses, enabling fast, CI-runnable tests without external API calls.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use engram_core::traits::{PluginAdapter, ProviderAdapter};
use engram_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage,
};
use engram_core::EngramError;

/// A mock provider that returns pre-configured responses.
///
/// Responses are popped from a FIFO queue. When the queue is empty,
/// a default "mock response" text is returned.
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<String>>>,
}

impl MockProvider {
    /// Create a new mock provider with an empty response queue.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Create a mock provider pre-loaded with the given responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::from(responses))),
        }
    }

    /// Add a response to the end of the queue.
    pub async fn add_response(&self, text: String) {
        self.responses.lock().await.push_back(text);
    }

    async fn next_response(&self) -> String {
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| "mock response".to_string())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, EngramError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), EngramError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, EngramError> {
        let text = self.next_response().await;
        Ok(ProviderResponse {
            id: format!("mock-resp-{}", uuid::Uuid::new_v4()),
            content: text,
            model: request.model,
            stop_reason: Some("end_turn".to_string()),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        })
    }
}
