// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relational memory core for fleets of independent AI agents.
//!
//! A persistent, scored, versioned, graph-relational memory store:
//!
//! - **ScoringEngine**: quality score with exponential time decay
//! - **VectorStore**: pluggable similarity search (SQLite reference impl)
//! - **VersionManager**: immutable version chains with a movable latest pointer
//! - **EntityExtractor**: model-based extraction with a rule fallback
//! - **RelationBuilder**: automatic typed-edge discovery between memories
//! - **HybridRetriever**: vector search + bounded graph expansion + inference paths
//! - **ConflictDetector / ConflictResolver**: claim and semantic conflicts, five strategies
//! - **PoolRouter / PoolPromoter**: private/domain/global pools under a token budget
//! - **GovernanceService**: retention, access, and conflict-resolution policies
//! - **MemoryService**: the exposed API facade
//! - **Workers**: queue consumers and periodic maintenance sweeps

pub mod conflicts;
pub mod extractor;
pub mod governance;
pub mod pools;
pub mod relations;
pub mod retriever;
pub mod scoring;
pub mod service;
pub mod vector;
pub mod versions;
pub mod workers;

pub use conflicts::{ConflictDetector, ConflictResolver, ResolutionOutcome, ResolutionStrategy};
pub use extractor::EntityExtractor;
pub use governance::GovernanceService;
pub use pools::{PoolPromoter, PoolRetrievalOptions, PoolRouter};
pub use relations::RelationBuilder;
pub use retriever::{HybridRetriever, RetrievalOptions, RetrievalResult};
pub use scoring::ScoringEngine;
pub use service::{CreateMemoryRequest, CreatedMemory, MemoryService, QueryOptions};
pub use vector::{SqliteVectorStore, VectorStore};
pub use versions::{VersionManager, VersionPatch};
pub use workers::Workers;
