// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Namespace grammar validation.
//!
//! Namespaces partition memories hierarchically as `org/scope(/scope)*`:
//! at least two segments, each lowercase alphanumeric with interior
//! hyphens or underscores. Validation happens before any side effect on
//! the write path.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::EngramError;

static NAMESPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_-]*(/[a-z0-9][a-z0-9_-]*)+$")
        .expect("namespace regex is valid")
});

/// Maximum namespace length accepted at write time.
const MAX_NAMESPACE_LEN: usize = 255;

/// Validate a namespace against the `org/scope(/scope)*` grammar.
pub fn validate_namespace(namespace: &str) -> Result<(), EngramError> {
    if namespace.len() > MAX_NAMESPACE_LEN || !NAMESPACE_RE.is_match(namespace) {
        return Err(EngramError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

/// The leading (organization) segment of a validated namespace.
pub fn namespace_org(namespace: &str) -> &str {
    namespace.split('/').next().unwrap_or(namespace)
}
