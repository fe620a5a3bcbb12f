// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anthropic Messages API request/response types.

use serde::{Deserialize, Serialize};

/// A request to the Anthropic Messages API.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    /// Model identifier (e.g., "claude-sonnet-4-20250514").
    pub model: String,

    /// Conversation messages.
    pub messages: Vec<ApiMessage>,

    /// System prompt (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

/// A single message in the Anthropic conversation format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage {
    /// Role: "user" or "assistant".
    pub role: String,
    /// Plain text content.
    pub content: String,
}

/// A non-streaming response from the Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub model: String,
    pub content: Vec<ResponseContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    pub usage: ApiUsage,
}

impl MessageResponse {
    /// Concatenated text of all text content blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text.as_str()),
                ResponseContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A content block in a response.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    /// Block types this crate does not consume (tool_use etc.).
    #[serde(other)]
    Other,
}

/// Token usage reported by the API.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ApiUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// Error envelope returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

/// The error payload inside an [`ApiErrorResponse`].
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(rename = "type")]
    pub type_: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_without_null_system() {
        let request = MessageRequest {
            model: "claude-sonnet-4-20250514".to_string(),
            messages: vec![ApiMessage {
                role: "user".to_string(),
                content: "hello".to_string(),
            }],
            system: None,
            max_tokens: 256,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("system").is_none());
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[test]
    fn response_text_joins_text_blocks() {
        let raw = r#"{
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                {"type": "text", "text": "first "},
                {"type": "tool_use", "id": "t1", "name": "x", "input": {}},
                {"type": "text", "text": "second"}
            ],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 5, "output_tokens": 9}
        }"#;
        let response: MessageResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.text(), "first second");
        assert_eq!(response.usage.input_tokens, 5);
    }

    #[test]
    fn error_envelope_parses() {
        let raw = r#"{"error": {"type": "overloaded_error", "message": "try later"}}"#;
        let parsed: ApiErrorResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.error.type_, "overloaded_error");
    }
}
