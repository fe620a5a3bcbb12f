// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic mock embedding adapter.
//!
//! `MockEmbedder` derives each vector from a SHA-256 digest of the text,
//! so identical texts always embed identically and different texts land
//! far apart — no model files, no network. `MockEmbedder::constant`
//! instead returns the same unit vector for every text, which makes all
//! similarities 1.0; useful when a test wants every stored entry to match
//! a query.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use engram_core::traits::{EmbeddingAdapter, PluginAdapter};
use engram_core::types::{
    AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus,
};
use engram_core::EngramError;

/// Deterministic, dependency-free embedding adapter for tests.
pub struct MockEmbedder {
    dimensions: usize,
    constant: bool,
}

impl MockEmbedder {
    /// Hash-derived vectors of the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            constant: false,
        }
    }

    /// The same unit vector for every input text.
    pub fn constant(dimensions: usize) -> Self {
        Self {
            dimensions,
            constant: true,
        }
    }

    /// Embed a single text deterministically.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        if self.constant {
            let mut v = vec![0.0; self.dimensions];
            if let Some(first) = v.first_mut() {
                *first = 1.0;
            }
            return v;
        }

        // Cycle SHA-256 digests until the vector is filled, then normalize.
        let mut bytes = Vec::with_capacity(self.dimensions);
        let mut counter: u32 = 0;
        while bytes.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(text.as_bytes());
            hasher.update(counter.to_le_bytes());
            bytes.extend_from_slice(&hasher.finalize());
            counter += 1;
        }

        let raw: Vec<f32> = bytes[..self.dimensions]
            .iter()
            .map(|&b| (b as f32 / 255.0) - 0.5)
            .collect();
        let norm: f32 = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            raw.iter().map(|v| v / norm).collect()
        } else {
            raw
        }
    }
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, EngramError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), EngramError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, EngramError> {
        let embeddings = input.texts.iter().map(|t| self.embed_text(t)).collect();
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: self.dimensions,
        })
    }
}
