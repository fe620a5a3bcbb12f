// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::EngramError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{EmbeddingInput, EmbeddingOutput};

/// Adapter for generating vector embeddings from text.
///
/// Embedding adapters power similarity search and relation-candidate
/// discovery by converting content into vector representations. A single
/// call embeds one or many texts; `output.embeddings` is index-aligned
/// with `input.texts`.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Generates embeddings for the given input.
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, EngramError>;
}
