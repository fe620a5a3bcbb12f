// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for Engram's external collaborators.
//!
//! The memory core consumes embedding generation, model completion,
//! background task execution, and organization quotas through these
//! traits; concrete implementations are pluggable. All adapters extend
//! the [`PluginAdapter`] base trait and use `#[async_trait]` for dynamic
//! dispatch compatibility.

pub mod adapter;
pub mod embedding;
pub mod provider;
pub mod queue;
pub mod quota;

pub use adapter::PluginAdapter;
pub use embedding::EmbeddingAdapter;
pub use provider::ProviderAdapter;
pub use queue::TaskQueueAdapter;
pub use quota::QuotaAdapter;
