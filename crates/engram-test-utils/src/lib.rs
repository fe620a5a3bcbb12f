// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic mocks and database fixtures for Engram tests.
//!
//! - `MockProvider`: FIFO canned model responses
//! - `MockEmbedder`: SHA-256-derived (or constant) embedding vectors
//! - `harness`: in-memory database with seeded organization

pub mod harness;
pub mod mock_embedder;
pub mod mock_provider;

pub use mock_embedder::MockEmbedder;
pub use mock_provider::MockProvider;
