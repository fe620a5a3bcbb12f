// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Claude provider adapter for the Engram memory store.
//!
//! Implements [`ProviderAdapter`] over the Messages API. The memory core
//! uses one-shot completions only (entity extraction, relation inference,
//! contradiction checks, arbitration), so this adapter does not stream.

pub mod client;
pub mod types;

use async_trait::async_trait;
use engram_config::EngramConfig;
use engram_core::traits::{PluginAdapter, ProviderAdapter};
use engram_core::types::{
    AdapterType, HealthStatus, ProviderRequest, ProviderResponse, TokenUsage,
};
use engram_core::EngramError;
use tracing::info;

use crate::client::AnthropicClient;
use crate::types::{ApiMessage, MessageRequest};

/// Anthropic Claude provider implementing [`ProviderAdapter`].
///
/// API key resolution order: config -> `ANTHROPIC_API_KEY` env var -> error.
pub struct AnthropicProvider {
    client: AnthropicClient,
}

impl AnthropicProvider {
    /// Creates a new Anthropic provider from the given configuration.
    pub fn new(config: &EngramConfig) -> Result<Self, EngramError> {
        let api_key = resolve_api_key(&config.anthropic.api_key)?;
        let client = AnthropicClient::new(
            api_key,
            config.anthropic.api_version.clone(),
            config.anthropic.default_model.clone(),
        )?;

        info!(
            model = config.anthropic.default_model,
            "Anthropic provider initialized"
        );
        Ok(Self { client })
    }

    /// Wraps an already-built client (used by tests).
    pub fn with_client(client: AnthropicClient) -> Self {
        Self { client }
    }
}

/// Resolve the API key from config or the environment.
fn resolve_api_key(configured: &Option<String>) -> Result<String, EngramError> {
    if let Some(key) = configured {
        if !key.trim().is_empty() {
            return Ok(key.clone());
        }
    }
    match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(EngramError::Config(
            "no Anthropic API key: set anthropic.api_key or ANTHROPIC_API_KEY".to_string(),
        )),
    }
}

#[async_trait]
impl PluginAdapter for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, EngramError> {
        // No dedicated health endpoint; a constructed client is healthy.
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), EngramError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, EngramError> {
        let model = if request.model.is_empty() {
            self.client.default_model().to_string()
        } else {
            request.model
        };

        let api_request = MessageRequest {
            model: model.clone(),
            messages: request
                .messages
                .into_iter()
                .map(|m| ApiMessage {
                    role: m.role,
                    content: m.content,
                })
                .collect(),
            system: request.system_prompt,
            max_tokens: request.max_tokens,
        };

        let response = self.client.complete_message(&api_request).await?;
        Ok(ProviderResponse {
            id: response.id.clone(),
            content: response.text(),
            model: response.model.clone(),
            stop_reason: response.stop_reason.clone(),
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
        })
    }
}
