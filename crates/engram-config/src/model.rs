// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Engram memory store.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level Engram configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngramConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Anthropic API settings for model-based reasoning.
    #[serde(default)]
    pub anthropic: AnthropicConfig,

    /// Retrieval and relation-building settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Scoring engine settings.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Memory pool routing and promotion settings.
    #[serde(default)]
    pub pools: PoolConfig,

    /// Conflict detection and resolution settings.
    #[serde(default)]
    pub conflicts: ConflictConfig,

    /// Governance policy cache settings.
    #[serde(default)]
    pub governance: GovernanceConfig,

    /// Background worker intervals.
    #[serde(default)]
    pub workers: WorkerConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service instance.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "engram".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("engram").join("engram.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("engram.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Anthropic API configuration.
///
/// When `api_key` is unset, every model-based strategy (entity extraction,
/// relation inference, semantic conflict scan, arbitration) degrades to
/// its rule-based fallback.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AnthropicConfig {
    /// Anthropic API key. `None` disables model-based strategies.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Default model to use for reasoning requests.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Anthropic API version string.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_model: default_model(),
            max_tokens: default_max_tokens(),
            api_version: default_api_version(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_api_version() -> String {
    "2023-06-01".to_string()
}

/// Retrieval and relation-building configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Minimum cosine similarity for a vector match (0.0-1.0).
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Maximum direct matches returned by a vector search.
    #[serde(default = "default_max_retrieval_results")]
    pub max_retrieval_results: usize,

    /// Default BFS expansion depth for hybrid retrieval.
    #[serde(default = "default_max_graph_depth")]
    pub max_graph_depth: usize,

    /// Minimum inferred confidence for a relation edge to be persisted.
    #[serde(default = "default_relation_confidence_threshold")]
    pub relation_confidence_threshold: f64,

    /// Top-K vector candidates considered when building relations.
    #[serde(default = "default_relation_candidate_limit")]
    pub relation_candidate_limit: usize,

    /// Window for temporal-proximity relation candidates, in hours.
    #[serde(default = "default_temporal_window_hours")]
    pub temporal_window_hours: i64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_retrieval_results: default_max_retrieval_results(),
            max_graph_depth: default_max_graph_depth(),
            relation_confidence_threshold: default_relation_confidence_threshold(),
            relation_candidate_limit: default_relation_candidate_limit(),
            temporal_window_hours: default_temporal_window_hours(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.35
}

fn default_max_retrieval_results() -> usize {
    50
}

fn default_max_graph_depth() -> usize {
    2
}

fn default_relation_confidence_threshold() -> f64 {
    0.6
}

fn default_relation_candidate_limit() -> usize {
    10
}

fn default_temporal_window_hours() -> i64 {
    24
}

/// Scoring engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    /// Enable the reputation-feedback variant that nudges quality score
    /// by the producing agent's reputation.
    #[serde(default)]
    pub reputation_feedback: bool,

    /// Cached scores older than this are recomputed by the score sweep.
    #[serde(default = "default_score_stale_secs")]
    pub stale_after_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            reputation_feedback: false,
            stale_after_secs: default_score_stale_secs(),
        }
    }
}

fn default_score_stale_secs() -> u64 {
    3600
}

/// Memory pool routing and promotion configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    /// Total token budget for a pool retrieval (~4 characters/token).
    #[serde(default = "default_pool_max_tokens")]
    pub max_tokens: usize,

    /// Maximum results taken from each pool layer.
    #[serde(default = "default_per_pool_limit")]
    pub per_pool_limit: usize,

    /// Validations required before a domain entry is eligible for promotion.
    #[serde(default = "default_promotion_validation_threshold")]
    pub promotion_validation_threshold: i64,

    /// Minimum cached final score for promotion.
    #[serde(default = "default_promotion_min_score")]
    pub promotion_min_score: f64,

    /// Per-department overrides for the validation threshold.
    #[serde(default)]
    pub validation_overrides: HashMap<String, i64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_pool_max_tokens(),
            per_pool_limit: default_per_pool_limit(),
            promotion_validation_threshold: default_promotion_validation_threshold(),
            promotion_min_score: default_promotion_min_score(),
            validation_overrides: HashMap::new(),
        }
    }
}

fn default_pool_max_tokens() -> usize {
    4096
}

fn default_per_pool_limit() -> usize {
    10
}

fn default_promotion_validation_threshold() -> i64 {
    5
}

fn default_promotion_min_score() -> f64 {
    60.0
}

/// Conflict detection and resolution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictConfig {
    /// `confidence-wins` falls back to arbitration below this gap.
    #[serde(default = "default_min_confidence_delta")]
    pub min_confidence_delta: f64,

    /// Pairs per model request in the semantic scan.
    #[serde(default = "default_semantic_batch_size")]
    pub semantic_batch_size: usize,

    /// Delay between semantic-scan batches, for provider rate limits.
    #[serde(default = "default_semantic_batch_delay_ms")]
    pub semantic_batch_delay_ms: u64,

    /// Strategic-pool candidate filter: minimum confidence.
    #[serde(default = "default_semantic_min_confidence")]
    pub semantic_min_confidence: f64,

    /// Strategic-pool candidate filter: minimum usage count.
    #[serde(default = "default_semantic_min_usage")]
    pub semantic_min_usage: i64,

    /// Strategic-pool candidate filter: maximum age in days.
    #[serde(default = "default_semantic_max_age_days")]
    pub semantic_max_age_days: i64,

    /// Minimum model confidence to persist a semantic contradiction.
    #[serde(default = "default_semantic_confidence_floor")]
    pub semantic_confidence_floor: f64,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            min_confidence_delta: default_min_confidence_delta(),
            semantic_batch_size: default_semantic_batch_size(),
            semantic_batch_delay_ms: default_semantic_batch_delay_ms(),
            semantic_min_confidence: default_semantic_min_confidence(),
            semantic_min_usage: default_semantic_min_usage(),
            semantic_max_age_days: default_semantic_max_age_days(),
            semantic_confidence_floor: default_semantic_confidence_floor(),
        }
    }
}

fn default_min_confidence_delta() -> f64 {
    0.1
}

fn default_semantic_batch_size() -> usize {
    10
}

fn default_semantic_batch_delay_ms() -> u64 {
    1000
}

fn default_semantic_min_confidence() -> f64 {
    0.8
}

fn default_semantic_min_usage() -> i64 {
    5
}

fn default_semantic_max_age_days() -> i64 {
    90
}

fn default_semantic_confidence_floor() -> f64 {
    0.7
}

/// Governance policy cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GovernanceConfig {
    /// TTL of the process-local policy cache, in seconds.
    #[serde(default = "default_policy_cache_ttl_secs")]
    pub policy_cache_ttl_secs: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            policy_cache_ttl_secs: default_policy_cache_ttl_secs(),
        }
    }
}

fn default_policy_cache_ttl_secs() -> u64 {
    60
}

/// Background worker interval configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Interval for the decayed-score recomputation sweep.
    #[serde(default = "default_score_interval_secs")]
    pub score_interval_secs: u64,

    /// Interval for org-wide retention enforcement.
    #[serde(default = "default_retention_interval_secs")]
    pub retention_interval_secs: u64,

    /// Interval for the batched semantic-conflict scan.
    #[serde(default = "default_semantic_scan_interval_secs")]
    pub semantic_scan_interval_secs: u64,

    /// Interval for the promotion-eligibility scan.
    #[serde(default = "default_promotion_interval_secs")]
    pub promotion_interval_secs: u64,

    /// Poll interval for queue consumers when the queue is empty.
    #[serde(default = "default_queue_poll_interval_secs")]
    pub queue_poll_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            score_interval_secs: default_score_interval_secs(),
            retention_interval_secs: default_retention_interval_secs(),
            semantic_scan_interval_secs: default_semantic_scan_interval_secs(),
            promotion_interval_secs: default_promotion_interval_secs(),
            queue_poll_interval_secs: default_queue_poll_interval_secs(),
        }
    }
}

fn default_score_interval_secs() -> u64 {
    3600
}

fn default_retention_interval_secs() -> u64 {
    3600
}

fn default_semantic_scan_interval_secs() -> u64 {
    21600 // 6 hours
}

fn default_promotion_interval_secs() -> u64 {
    3600
}

fn default_queue_poll_interval_secs() -> u64 {
    5
}
