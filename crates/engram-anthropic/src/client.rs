// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Anthropic Messages API.
//!
//! Handles request construction, authentication headers, and transient
//! error retry for one-shot completions.

use std::time::Duration;

use engram_core::EngramError;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::types::{ApiErrorResponse, MessageRequest, MessageResponse};

/// Base URL for the Anthropic Messages API.
const API_BASE_URL: &str = "https://api.anthropic.com/v1/messages";

/// HTTP client for Anthropic API communication.
///
/// Manages authentication headers, connection pooling, and retry logic
/// for transient errors (429, 500, 503).
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    default_model: String,
    max_retries: u32,
    base_url: String,
}

impl AnthropicClient {
    /// Creates a new Anthropic API client.
    ///
    /// # Arguments
    /// * `api_key` - Anthropic API key for authentication
    /// * `api_version` - API version string (e.g., "2023-06-01")
    /// * `model` - Default model identifier
    pub fn new(api_key: String, api_version: String, model: String) -> Result<Self, EngramError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key)
                .map_err(|e| EngramError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&api_version).map_err(|e| {
                EngramError::Config(format!("invalid API version header value: {e}"))
            })?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| EngramError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            default_model: model,
            max_retries: 1,
            base_url: API_BASE_URL.to_string(),
        })
    }

    /// Returns the default model identifier.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Sends a one-shot completion request.
    ///
    /// On transient errors (429, 500, 503), retries once after a 1-second delay.
    pub async fn complete_message(
        &self,
        request: &MessageRequest,
    ) -> Result<MessageResponse, EngramError> {
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(attempt, "retrying completion request after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let response = self
                .client
                .post(&self.base_url)
                .json(request)
                .send()
                .await
                .map_err(|e| EngramError::Provider {
                    message: format!("HTTP request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, "completion response received");

            if status.is_success() {
                return response.json::<MessageResponse>().await.map_err(|e| {
                    EngramError::Provider {
                        message: format!("failed to decode response body: {e}"),
                        source: Some(Box::new(e)),
                    }
                });
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient_error(status) && attempt < self.max_retries {
                warn!(status = %status, body = %body, "transient error, will retry");
                continue;
            }

            // Non-transient error or exhausted retries.
            let message = if let Ok(api_err) = serde_json::from_str::<ApiErrorResponse>(&body) {
                format!(
                    "Anthropic API error ({}): {}",
                    api_err.error.type_, api_err.error.message
                )
            } else {
                format!("API returned {status}: {body}")
            };
            return Err(EngramError::Provider {
                message,
                source: None,
            });
        }

        unreachable!("retry loop always returns")
    }
}

/// Whether an HTTP status warrants a retry.
fn is_transient_error(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 503)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiMessage;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> MessageRequest {
        MessageRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: "ping".to_string(),
            }],
            system: None,
            max_tokens: 64,
        }
    }

    fn success_body() -> serde_json::Value {
        serde_json::json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [{"type": "text", "text": "pong"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 3, "output_tokens": 2}
        })
    }

    fn client(base_url: String) -> AnthropicClient {
        AnthropicClient::new(
            "sk-ant-test".to_string(),
            "2023-06-01".to_string(),
            "claude-sonnet-4-20250514".to_string(),
        )
        .unwrap()
        .with_base_url(base_url)
    }

    #[tokio::test]
    async fn complete_sends_auth_headers_and_decodes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(server.uri()).complete_message(&request()).await.unwrap();
        assert_eq!(response.text(), "pong");
        assert_eq!(response.usage.output_tokens, 2);
    }

    #[tokio::test]
    async fn transient_error_is_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body()))
            .expect(1)
            .mount(&server)
            .await;

        let response = client(server.uri()).complete_message(&request()).await.unwrap();
        assert_eq!(response.text(), "pong");
    }

    #[tokio::test]
    async fn non_transient_error_fails_with_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"type": "invalid_request_error", "message": "bad model"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(server.uri()).complete_message(&request()).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("invalid_request_error"));
        assert!(msg.contains("bad model"));
    }

    #[tokio::test]
    async fn exhausted_retries_surface_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(server.uri()).complete_message(&request()).await.unwrap_err();
        assert!(matches!(err, EngramError::Provider { .. }));
    }
}
