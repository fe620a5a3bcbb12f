// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types shared across the Engram workspace.
//!
//! Enums that are persisted to SQLite carry manual `as_str` /
//! `from_str_value` conversions so the stored strings stay stable even if
//! variant names are refactored.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifies the type of adapter behind the [`crate::traits::PluginAdapter`] base trait.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Embedding,
    Queue,
    Quota,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// What kind of content a memory entry holds.
///
/// Drives the default decay rate when no `memory_type` is set, and whether
/// an embedding is mandatory at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    Conversation,
    Document,
    Code,
    Insight,
    Fact,
    /// Opaque payloads (images, archives). The only type that may be
    /// written without an embedding.
    Binary,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Conversation => "conversation",
            ContentType::Document => "document",
            ContentType::Code => "code",
            ContentType::Insight => "insight",
            ContentType::Fact => "fact",
            ContentType::Binary => "binary",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "conversation" => ContentType::Conversation,
            "document" => ContentType::Document,
            "code" => ContentType::Code,
            "insight" => ContentType::Insight,
            "binary" => ContentType::Binary,
            _ => ContentType::Fact,
        }
    }

    /// Whether a write of this content type must fail when no embedding
    /// could be generated.
    pub fn requires_embedding(&self) -> bool {
        !matches!(self, ContentType::Binary)
    }

    /// Default exponential decay rate when the entry has no memory type.
    pub fn default_decay_factor(&self) -> f64 {
        match self {
            ContentType::Conversation => 0.05,
            ContentType::Document => 0.01,
            ContentType::Code => 0.02,
            ContentType::Insight => 0.005,
            ContentType::Fact => 0.01,
            ContentType::Binary => 0.01,
        }
    }
}

/// Cognitive category of a memory, selecting its decay rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryType {
    /// Events and observations. Half-life ~14 days.
    Episodic,
    /// Facts and concepts. Half-life ~70 days.
    Semantic,
    /// Long-horizon goals and plans. Half-life ~693 days.
    Strategic,
    /// How-to knowledge. Half-life ~35 days.
    Procedural,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Strategic => "strategic",
            MemoryType::Procedural => "procedural",
        }
    }

    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "episodic" => Some(MemoryType::Episodic),
            "semantic" => Some(MemoryType::Semantic),
            "strategic" => Some(MemoryType::Strategic),
            "procedural" => Some(MemoryType::Procedural),
            _ => None,
        }
    }

    /// Decay rate λ for `exp(-λ · days)`.
    pub fn decay_factor(&self) -> f64 {
        match self {
            MemoryType::Episodic => 0.05,
            MemoryType::Semantic => 0.01,
            MemoryType::Strategic => 0.001,
            MemoryType::Procedural => 0.02,
        }
    }
}

/// Visibility layer of a memory within its organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolType {
    /// Visible only to the owning agent.
    Private,
    /// Visible to one department.
    Domain,
    /// Visible org-wide.
    Global,
}

impl PoolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::Private => "private",
            PoolType::Domain => "domain",
            PoolType::Global => "global",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "private" => PoolType::Private,
            "domain" => PoolType::Domain,
            _ => PoolType::Global,
        }
    }
}

/// Typed edge between two memory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    Causes,
    Contradicts,
    Supports,
    TemporalBefore,
    TemporalAfter,
    DerivedFrom,
    PartOf,
    SimilarTo,
    Impacts,
}

impl RelationType {
    pub const ALL: [RelationType; 9] = [
        RelationType::Causes,
        RelationType::Contradicts,
        RelationType::Supports,
        RelationType::TemporalBefore,
        RelationType::TemporalAfter,
        RelationType::DerivedFrom,
        RelationType::PartOf,
        RelationType::SimilarTo,
        RelationType::Impacts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Causes => "CAUSES",
            RelationType::Contradicts => "CONTRADICTS",
            RelationType::Supports => "SUPPORTS",
            RelationType::TemporalBefore => "TEMPORAL_BEFORE",
            RelationType::TemporalAfter => "TEMPORAL_AFTER",
            RelationType::DerivedFrom => "DERIVED_FROM",
            RelationType::PartOf => "PART_OF",
            RelationType::SimilarTo => "SIMILAR_TO",
            RelationType::Impacts => "IMPACTS",
        }
    }

    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "CAUSES" => Some(RelationType::Causes),
            "CONTRADICTS" => Some(RelationType::Contradicts),
            "SUPPORTS" => Some(RelationType::Supports),
            "TEMPORAL_BEFORE" => Some(RelationType::TemporalBefore),
            "TEMPORAL_AFTER" => Some(RelationType::TemporalAfter),
            "DERIVED_FROM" => Some(RelationType::DerivedFrom),
            "PART_OF" => Some(RelationType::PartOf),
            "SIMILAR_TO" => Some(RelationType::SimilarTo),
            "IMPACTS" => Some(RelationType::Impacts),
            _ => None,
        }
    }
}

/// How a relation edge was inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferredBy {
    Model,
    Rule,
}

impl InferredBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            InferredBy::Model => "model",
            InferredBy::Rule => "rule",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "model" => InferredBy::Model,
            _ => InferredBy::Rule,
        }
    }
}

/// How a conflict between two memories was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictType {
    /// Same claim key, different claim value, same namespace.
    ClaimMismatch,
    /// A model judged the two contents contradictory.
    SemanticContradiction,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::ClaimMismatch => "claim_mismatch",
            ConflictType::SemanticContradiction => "semantic_contradiction",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "semantic_contradiction" => ConflictType::SemanticContradiction,
            _ => ConflictType::ClaimMismatch,
        }
    }
}

/// Lifecycle status of a conflict.
///
/// `Queued` is the transient queued-for-arbitration state; arbitration
/// failure returns the conflict to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictStatus {
    Pending,
    Queued,
    Resolved,
    Ignored,
}

impl ConflictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStatus::Pending => "pending",
            ConflictStatus::Queued => "queued",
            ConflictStatus::Resolved => "resolved",
            ConflictStatus::Ignored => "ignored",
        }
    }

    pub fn from_str_value(s: &str) -> Self {
        match s {
            "queued" => ConflictStatus::Queued,
            "resolved" => ConflictStatus::Resolved,
            "ignored" => ConflictStatus::Ignored,
            _ => ConflictStatus::Pending,
        }
    }
}

/// Scope of a governance policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyType {
    Retention,
    Access,
    ConflictResolution,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Retention => "retention",
            PolicyType::Access => "access",
            PolicyType::ConflictResolution => "conflict_resolution",
        }
    }

    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "retention" => Some(PolicyType::Retention),
            "access" => Some(PolicyType::Access),
            "conflict_resolution" => Some(PolicyType::ConflictResolution),
            _ => None,
        }
    }
}

/// Display-only quality bucket derived from a 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QualityTier {
    Platinum,
    Gold,
    Silver,
    Bronze,
}

impl QualityTier {
    /// Bucket a score on the 0-100 display scale.
    pub fn for_score(score: f64) -> Self {
        if score >= 80.0 {
            QualityTier::Platinum
        } else if score >= 60.0 {
            QualityTier::Gold
        } else if score >= 40.0 {
            QualityTier::Silver
        } else {
            QualityTier::Bronze
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Platinum => "platinum",
            QualityTier::Gold => "gold",
            QualityTier::Silver => "silver",
            QualityTier::Bronze => "bronze",
        }
    }
}

/// The atomic unit of knowledge in the store.
///
/// Entries are append-only: content changes always produce a new row
/// linked via `parent_id`, never an in-place mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Time-sortable opaque identifier (UUIDv7).
    pub id: String,
    /// Owning organization.
    pub org_id: String,
    /// Hierarchical scope, `org/scope(/scope)*`.
    pub namespace: String,
    pub content_type: ContentType,
    pub content: String,
    /// Embedding vector; absent only for content types that permit it.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    /// Free-form JSON metadata.
    pub metadata: serde_json::Value,
    /// Clamped to [0, 1] at write time.
    pub confidence: f64,
    /// Clamped to [0, 100] at write time.
    pub reputation: f64,
    pub usage_count: i64,
    pub validation_count: i64,
    /// 1-based position within the version chain.
    pub version: i64,
    pub parent_id: Option<String>,
    /// Stable across the whole version chain.
    pub root_id: String,
    pub is_latest: bool,
    pub memory_type: Option<MemoryType>,
    pub pool_type: PoolType,
    pub department: Option<String>,
    /// Producing agent.
    pub agent_id: Option<String>,
    pub claim_key: Option<String>,
    pub claim_value: Option<String>,
    /// Set by `archive_old_versions`; archived rows stay queryable by id
    /// but are excluded from retrieval.
    pub archived: bool,
    pub created_at: String,
    pub updated_at: String,
    pub accessed_at: String,
    pub expires_at: Option<String>,
    /// Exponential decay rate λ, fixed at write time.
    pub decay_factor: f64,
    /// Timestamp the decay clock was last reset (creation or new version).
    pub decay_checkpoint: String,
}

/// Cached score, one-to-one with a [`MemoryEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryScore {
    pub base_score: f64,
    pub decay_multiplier: f64,
    pub final_score: f64,
}

/// A directed, typed edge between two memory entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRelation {
    pub id: i64,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: RelationType,
    /// Edge strength in [0, 1].
    pub strength: f64,
    pub reason: String,
    pub inferred_by: InferredBy,
    pub created_at: String,
}

/// A detected contradiction between two memory entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConflict {
    pub id: String,
    pub org_id: String,
    pub first_id: String,
    pub second_id: String,
    pub conflict_type: ConflictType,
    pub status: ConflictStatus,
    pub winning_id: Option<String>,
    pub resolved_by: Option<String>,
    pub explanation: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

/// A governance policy scoped to (organization, namespace, policy type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPolicy {
    pub id: String,
    pub org_id: String,
    pub namespace: String,
    pub policy_type: PolicyType,
    /// Rules payload, interpreted by the governance service per policy type.
    pub rules: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

/// Rules payload for [`PolicyType::Retention`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionRules {
    /// Expire entries older than this many seconds.
    pub max_age_seconds: Option<i64>,
    /// Trim the oldest entries beyond this count.
    pub max_count: Option<i64>,
    /// When false, breaches are logged but nothing is expired.
    pub expire_on_breach: Option<bool>,
}

impl RetentionRules {
    pub fn expire_on_breach(&self) -> bool {
        self.expire_on_breach.unwrap_or(true)
    }
}

/// Rules payload for [`PolicyType::Access`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessRules {
    /// When non-empty, only these agents may operate in the namespace.
    pub allowed_agents: Vec<String>,
    pub read_only: bool,
    pub deny_all: bool,
}

/// Rules payload for [`PolicyType::ConflictResolution`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictRules {
    /// One of: latest-wins, confidence-wins, score-wins,
    /// queue-arbitration, manual-review.
    pub strategy: Option<String>,
    /// `confidence-wins` falls back to arbitration below this gap.
    pub min_confidence_delta: Option<f64>,
}

/// A normalized entity mention shared across entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTag {
    pub id: i64,
    pub org_id: String,
    pub name: String,
    pub entity_type: String,
    pub mention_count: i64,
    pub confidence: f64,
}

/// Operations gated by access policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOp {
    Create,
    Read,
    Update,
    Delete,
    Archive,
}

impl AccessOp {
    /// Whether this operation mutates the store.
    pub fn is_write(&self) -> bool {
        !matches!(self, AccessOp::Read)
    }
}

/// Current quota state for an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub max: i64,
    pub used: i64,
}

// --- Embedding types ---

/// Input for an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding adapter.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

// --- Provider types ---

/// A single message in a provider conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: String,
    pub content: String,
}

/// A one-shot completion request to a model provider.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: u32,
}

/// A completion response from a model provider.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
}

/// Token accounting from a provider call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

// --- Task queue types ---

/// Scheduling options for a background job.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Higher runs first.
    pub priority: i64,
    /// Initial delay before the job becomes runnable.
    pub delay: Option<std::time::Duration>,
    /// Total attempts before the job is marked failed.
    pub retries: u32,
    /// Base for exponential backoff between attempts.
    pub backoff: std::time::Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            delay: None,
            retries: 3,
            backoff: std::time::Duration::from_secs(2),
        }
    }
}

// --- Helpers ---

/// Current UTC time as the ISO-8601 string format used throughout the store.
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Cosine similarity of two equal-length vectors, clamped to [0, 1].
///
/// For L2-normalized embeddings the dot product equals the cosine; negative
/// values (anti-correlated content) are floored to zero because retrieval
/// treats similarity as a non-negative relevance signal.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_type_roundtrip() {
        for rt in RelationType::ALL {
            assert_eq!(RelationType::from_str_value(rt.as_str()), Some(rt));
        }
        assert_eq!(RelationType::from_str_value("NONE"), None);
    }

    #[test]
    fn memory_type_decay_factors() {
        assert_eq!(MemoryType::Episodic.decay_factor(), 0.05);
        assert_eq!(MemoryType::Semantic.decay_factor(), 0.01);
        assert_eq!(MemoryType::Strategic.decay_factor(), 0.001);
        assert_eq!(MemoryType::Procedural.decay_factor(), 0.02);
    }

    #[test]
    fn content_type_embedding_requirements() {
        assert!(ContentType::Fact.requires_embedding());
        assert!(ContentType::Code.requires_embedding());
        assert!(!ContentType::Binary.requires_embedding());
    }

    #[test]
    fn quality_tier_thresholds() {
        assert_eq!(QualityTier::for_score(92.0), QualityTier::Platinum);
        assert_eq!(QualityTier::for_score(80.0), QualityTier::Platinum);
        assert_eq!(QualityTier::for_score(60.0), QualityTier::Gold);
        assert_eq!(QualityTier::for_score(59.9), QualityTier::Silver);
        assert_eq!(QualityTier::for_score(40.0), QualityTier::Silver);
        assert_eq!(QualityTier::for_score(12.0), QualityTier::Bronze);
    }

    #[test]
    fn conflict_status_roundtrip() {
        for status in [
            ConflictStatus::Pending,
            ConflictStatus::Queued,
            ConflictStatus::Resolved,
            ConflictStatus::Ignored,
        ] {
            assert_eq!(ConflictStatus::from_str_value(status.as_str()), status);
        }
    }

    #[test]
    fn vec_to_blob_roundtrip() {
        let original = vec![0.1_f32, 0.2, 0.3, -0.5, 1.0];
        let blob = vec_to_blob(&original);
        assert_eq!(blob.len(), original.len() * 4);
        let recovered = blob_to_vec(&blob);
        assert_eq!(original.len(), recovered.len());
        for (a, b) in original.iter().zip(recovered.iter()) {
            assert!((a - b).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn cosine_similarity_identical() {
        let v = vec![0.6, 0.8, 0.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6, "identical vectors should have sim ~1.0, got {sim}");
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_opposite_clamps_to_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_similarity_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn retention_rules_default_expires() {
        let rules = RetentionRules::default();
        assert!(rules.expire_on_breach());

        let parsed: RetentionRules =
            serde_json::from_str(r#"{"max_age_seconds": 3600, "expire_on_breach": false}"#)
                .unwrap();
        assert_eq!(parsed.max_age_seconds, Some(3600));
        assert!(!parsed.expire_on_breach());
    }

    #[test]
    fn access_rules_parse_partial_payload() {
        let parsed: AccessRules =
            serde_json::from_str(r#"{"allowed_agents": ["agent-1"]}"#).unwrap();
        assert_eq!(parsed.allowed_agents, vec!["agent-1".to_string()]);
        assert!(!parsed.read_only);
        assert!(!parsed.deny_all);
    }

    #[test]
    fn job_options_defaults() {
        let opts = JobOptions::default();
        assert_eq!(opts.retries, 3);
        assert_eq!(opts.backoff, std::time::Duration::from_secs(2));
        assert!(opts.delay.is_none());
    }
}
