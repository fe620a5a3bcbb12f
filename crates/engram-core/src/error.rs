// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Engram memory store.

use thiserror::Error;

/// The primary error type used across all Engram adapter traits and core operations.
#[derive(Debug, Error)]
pub enum EngramError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Model provider errors (API failure, token limits, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Embedding generation failed for content that requires a vector.
    #[error("embedding error: {message}")]
    Embedding { message: String },

    /// A namespace string did not match the `org/scope(/scope)*` grammar.
    #[error("invalid namespace `{0}`")]
    InvalidNamespace(String),

    /// The organization has no remaining memory quota.
    #[error("quota exceeded for organization {org_id}: {used}/{max}")]
    QuotaExceeded { org_id: String, max: i64, used: i64 },

    /// A referenced row does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An access policy denied the requested operation.
    #[error("access denied: {reason}")]
    AccessDenied { reason: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
