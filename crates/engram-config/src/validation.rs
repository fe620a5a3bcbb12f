// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as threshold ranges and non-empty paths.

use crate::diagnostic::ConfigError;
use crate::model::EngramConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &EngramConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "service.log_level must be one of {}, got `{}`",
                LOG_LEVELS.join(", "),
                config.service.log_level
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    check_unit_range(
        &mut errors,
        "memory.similarity_threshold",
        config.memory.similarity_threshold,
    );
    check_unit_range(
        &mut errors,
        "memory.relation_confidence_threshold",
        config.memory.relation_confidence_threshold,
    );

    if config.memory.max_graph_depth == 0 || config.memory.max_graph_depth > 8 {
        errors.push(ConfigError::Validation {
            message: format!(
                "memory.max_graph_depth must be between 1 and 8, got {}",
                config.memory.max_graph_depth
            ),
        });
    }

    if config.memory.temporal_window_hours <= 0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "memory.temporal_window_hours must be positive, got {}",
                config.memory.temporal_window_hours
            ),
        });
    }

    if config.pools.max_tokens == 0 {
        errors.push(ConfigError::Validation {
            message: "pools.max_tokens must be positive".to_string(),
        });
    }

    if config.pools.per_pool_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "pools.per_pool_limit must be positive".to_string(),
        });
    }

    if !(0.0..=100.0).contains(&config.pools.promotion_min_score) {
        errors.push(ConfigError::Validation {
            message: format!(
                "pools.promotion_min_score must be within 0..=100, got {}",
                config.pools.promotion_min_score
            ),
        });
    }

    check_unit_range(
        &mut errors,
        "conflicts.min_confidence_delta",
        config.conflicts.min_confidence_delta,
    );
    check_unit_range(
        &mut errors,
        "conflicts.semantic_min_confidence",
        config.conflicts.semantic_min_confidence,
    );
    check_unit_range(
        &mut errors,
        "conflicts.semantic_confidence_floor",
        config.conflicts.semantic_confidence_floor,
    );

    if config.conflicts.semantic_batch_size == 0 {
        errors.push(ConfigError::Validation {
            message: "conflicts.semantic_batch_size must be positive".to_string(),
        });
    }

    if config.governance.policy_cache_ttl_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "governance.policy_cache_ttl_secs must be positive".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_unit_range(errors: &mut Vec<ConfigError>, key: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ConfigError::Validation {
            message: format!("{key} must be within 0..=1, got {value}"),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngramConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn bad_log_level_rejected() {
        let mut config = EngramConfig::default();
        config.service.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("log_level")));
    }

    #[test]
    fn out_of_range_thresholds_rejected() {
        let mut config = EngramConfig::default();
        config.memory.similarity_threshold = 1.5;
        config.conflicts.min_confidence_delta = -0.1;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn zero_graph_depth_rejected() {
        let mut config = EngramConfig::default();
        config.memory.max_graph_depth = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn empty_database_path_rejected() {
        let mut config = EngramConfig::default();
        config.storage.database_path = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn collects_all_errors_not_just_first() {
        let mut config = EngramConfig::default();
        config.service.log_level = "verbose".to_string();
        config.pools.max_tokens = 0;
        config.pools.promotion_min_score = 150.0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
