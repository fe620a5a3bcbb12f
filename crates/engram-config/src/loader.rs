// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./engram.toml` > `~/.config/engram/engram.toml` > `/etc/engram/engram.toml`
//! with environment variable overrides via `ENGRAM_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::EngramConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/engram/engram.toml` (system-wide)
/// 3. `~/.config/engram/engram.toml` (user XDG config)
/// 4. `./engram.toml` (local directory)
/// 5. `ENGRAM_*` environment variables
pub fn load_config() -> Result<EngramConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicitly supplied config content.
pub fn load_config_from_str(toml_content: &str) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<EngramConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(EngramConfig::default()))
        .merge(Toml::file("/etc/engram/engram.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("engram/engram.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("engram.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `ENGRAM_STORAGE_DATABASE_PATH`
/// must map to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("ENGRAM_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: ENGRAM_POOLS_MAX_TOKENS -> "pools_max_tokens"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("service_", "service.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("anthropic_", "anthropic.", 1)
            .replacen("memory_", "memory.", 1)
            .replacen("scoring_", "scoring.", 1)
            .replacen("pools_", "pools.", 1)
            .replacen("conflicts_", "conflicts.", 1)
            .replacen("governance_", "governance.", 1)
            .replacen("workers_", "workers.", 1);
        mapped.into()
    })
}
