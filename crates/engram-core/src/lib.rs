// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Engram memory store.
//!
//! This crate provides the foundational trait definitions, error types,
//! domain model, and namespace grammar used throughout the Engram
//! workspace. External collaborators (embedding providers, model
//! providers, task queues, quota services) implement traits defined here.

pub mod error;
pub mod namespace;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::EngramError;
pub use namespace::{namespace_org, validate_namespace};
pub use types::{AdapterType, HealthStatus};

// Re-export all adapter traits at crate root.
pub use traits::{
    EmbeddingAdapter, PluginAdapter, ProviderAdapter, QuotaAdapter, TaskQueueAdapter,
};
