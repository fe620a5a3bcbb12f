// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod conflicts;
pub mod entities;
pub mod entries;
pub mod orgs;
pub mod policies;
pub mod queue;
pub mod relations;
pub mod scores;
