// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quality scoring with exponential time decay.
//!
//! The cached score of an entry is `base · decay`: a 0-60 quality
//! component built from usage, validation ratio, and reputation, times an
//! exponential decay multiplier driven by the entry's decay rate. At query
//! time similarity is blended in as
//! `combined = similarity · 0.4 + final / 100` — similarity is capped at
//! 40% of the ranking scale and quality at 60%. That split is a design
//! constraint, not a tunable.

use chrono::{DateTime, Utc};
use engram_core::types::{MemoryEntry, MemoryScore};
use engram_config::model::ScoringConfig;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Computes quality scores and decay multipliers for memory entries.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    reputation_feedback: bool,
}

impl ScoringEngine {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            reputation_feedback: config.reputation_feedback,
        }
    }

    /// Score an entry as of now.
    pub fn score(&self, entry: &MemoryEntry) -> MemoryScore {
        self.score_at(entry, Utc::now())
    }

    /// Score an entry as of a fixed instant. Same inputs and instant
    /// always produce the same score.
    pub fn score_at(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> MemoryScore {
        let mut base = quality_score(entry.usage_count, entry.validation_count, entry.reputation);
        if self.reputation_feedback {
            base = (base * reputation_factor(entry.reputation)).clamp(0.0, 60.0);
        }
        let decay = decay_multiplier(entry.decay_factor, &entry.decay_checkpoint, now);
        MemoryScore {
            base_score: base,
            decay_multiplier: decay,
            final_score: base * decay,
        }
    }
}

/// Quality component on the 0-60 scale (60% of the 0-100 ranking scale).
///
/// Each of the three terms is clamped to 0-20:
/// usage `20·ln(usage+1)/10`, validation ratio `20·(validations/usage)`,
/// and reputation `20·(reputation/100)`.
pub fn quality_score(usage_count: i64, validation_count: i64, reputation: f64) -> f64 {
    let usage = usage_count.max(0) as f64;
    let usage_term = (20.0 * ((usage + 1.0).ln() / 10.0)).clamp(0.0, 20.0);
    let validation_term = if usage_count > 0 {
        (20.0 * validation_count.max(0) as f64 / usage).clamp(0.0, 20.0)
    } else {
        0.0
    };
    let reputation_term = (20.0 * reputation / 100.0).clamp(0.0, 20.0);
    usage_term + validation_term + reputation_term
}

/// Exponential decay `exp(-λ · days)` since the decay checkpoint.
///
/// A checkpoint in the future (clock skew) decays nothing. An unparseable
/// checkpoint is treated as fresh rather than zeroing the score.
pub fn decay_multiplier(decay_factor: f64, checkpoint_iso: &str, now: DateTime<Utc>) -> f64 {
    let checkpoint = match DateTime::parse_from_rfc3339(checkpoint_iso) {
        Ok(ts) => ts.with_timezone(&Utc),
        Err(_) => return 1.0,
    };
    let days = ((now - checkpoint).num_seconds() as f64 / SECONDS_PER_DAY).max(0.0);
    (-decay_factor.max(0.0) * days).exp()
}

/// Query-time ranking score: similarity capped at 40%, quality at 60%.
pub fn combined_score(similarity: f64, final_score: f64) -> f64 {
    similarity.clamp(0.0, 1.0) * 0.4 + (final_score / 100.0).clamp(0.0, 0.6)
}

/// Reputation-feedback nudge on the quality score: low-reputation
/// producers are penalized 10%, high-reputation producers boosted 10%.
fn reputation_factor(reputation: f64) -> f64 {
    if reputation < 30.0 {
        0.9
    } else if reputation > 70.0 {
        1.1
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use engram_core::types::QualityTier;

    fn entry_with(
        usage: i64,
        validations: i64,
        reputation: f64,
        decay_factor: f64,
        checkpoint: &str,
    ) -> MemoryEntry {
        let mut entry = base_entry();
        entry.usage_count = usage;
        entry.validation_count = validations;
        entry.reputation = reputation;
        entry.decay_factor = decay_factor;
        entry.decay_checkpoint = checkpoint.to_string();
        entry
    }

    fn base_entry() -> MemoryEntry {
        MemoryEntry {
            id: "m-1".to_string(),
            org_id: "acme".to_string(),
            namespace: "acme/eng".to_string(),
            content_type: engram_core::types::ContentType::Fact,
            content: "test".to_string(),
            embedding: None,
            metadata: serde_json::Value::Null,
            confidence: 0.9,
            reputation: 50.0,
            usage_count: 0,
            validation_count: 0,
            version: 1,
            parent_id: None,
            root_id: "m-1".to_string(),
            is_latest: true,
            memory_type: None,
            pool_type: engram_core::types::PoolType::Global,
            department: None,
            agent_id: None,
            claim_key: None,
            claim_value: None,
            archived: false,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
            accessed_at: "2026-01-01T00:00:00.000Z".to_string(),
            expires_at: None,
            decay_factor: 0.01,
            decay_checkpoint: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn engine() -> ScoringEngine {
        ScoringEngine::new(&ScoringConfig::default())
    }

    fn parse(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn fresh_entry_scenario() {
        // usage=15, validations=12, reputation=75, decay 0.01, 0 days old:
        // 20·ln(16)/10 + 20·(12/15) + 20·0.75 ≈ 5.5 + 16 + 15 = 36.5
        let now = parse("2026-01-01T00:00:00.000Z");
        let entry = entry_with(15, 12, 75.0, 0.01, "2026-01-01T00:00:00.000Z");
        let score = engine().score_at(&entry, now);

        assert!((score.base_score - 36.5).abs() < 0.1, "base {}", score.base_score);
        assert!((score.decay_multiplier - 1.0).abs() < 1e-9);
        assert!((score.final_score - 36.5).abs() < 0.1);
    }

    #[test]
    fn seventy_day_half_life_scenario() {
        // Same entry 70 days later with λ=0.01 (half-life ≈ 69.3 days):
        // decay ≈ 0.5, final ≈ 18.25.
        let now = parse("2026-03-12T00:00:00.000Z"); // 70 days after Jan 1
        let entry = entry_with(15, 12, 75.0, 0.01, "2026-01-01T00:00:00.000Z");
        let score = engine().score_at(&entry, now);

        assert!((score.decay_multiplier - 0.5).abs() < 0.01, "decay {}", score.decay_multiplier);
        assert!((score.final_score - 18.25).abs() < 0.5, "final {}", score.final_score);
    }

    #[test]
    fn scoring_is_idempotent_at_frozen_time() {
        let now = parse("2026-02-15T12:00:00.000Z");
        let entry = entry_with(7, 3, 60.0, 0.02, "2026-01-01T00:00:00.000Z");
        let a = engine().score_at(&entry, now);
        let b = engine().score_at(&entry, now);
        assert_eq!(a, b);
    }

    #[test]
    fn zero_usage_has_no_validation_term() {
        // validations/usage is undefined at usage 0; the term contributes nothing.
        let score = quality_score(0, 5, 50.0);
        assert!((score - 10.0).abs() < 1e-9, "only the reputation term should remain");
    }

    #[test]
    fn validation_ratio_is_clamped() {
        // More validations than usages cannot push the term past 20.
        let score = quality_score(1, 100, 0.0);
        let usage_term = 20.0 * (2.0_f64.ln() / 10.0);
        assert!((score - (usage_term + 20.0)).abs() < 1e-9);
    }

    #[test]
    fn quality_never_exceeds_sixty() {
        let score = quality_score(i64::MAX / 2, i64::MAX / 2, 100.0);
        assert!(score <= 60.0);
    }

    #[test]
    fn future_checkpoint_does_not_inflate() {
        let now = parse("2026-01-01T00:00:00.000Z");
        let decay = decay_multiplier(0.05, "2026-06-01T00:00:00.000Z", now);
        assert_eq!(decay, 1.0);
    }

    #[test]
    fn unparseable_checkpoint_is_fresh() {
        let now = parse("2026-01-01T00:00:00.000Z");
        assert_eq!(decay_multiplier(0.05, "not-a-date", now), 1.0);
    }

    #[test]
    fn combined_split_is_forty_sixty() {
        // A perfect similarity with no quality contributes exactly 0.4;
        // a perfect quality with no similarity contributes at most 0.6.
        assert!((combined_score(1.0, 0.0) - 0.4).abs() < 1e-9);
        assert!((combined_score(0.0, 60.0) - 0.6).abs() < 1e-9);
        assert!((combined_score(1.0, 60.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tier_of_combined_display_scale() {
        let display = combined_score(0.9, 55.0) * 100.0; // 36 + 55 = 91
        assert_eq!(QualityTier::for_score(display), QualityTier::Platinum);
    }

    #[test]
    fn reputation_feedback_nudges_quality() {
        let config = ScoringConfig {
            reputation_feedback: true,
            ..ScoringConfig::default()
        };
        let engine = ScoringEngine::new(&config);
        let now = parse("2026-01-01T00:00:00.000Z");

        let low = entry_with(10, 5, 20.0, 0.01, "2026-01-01T00:00:00.000Z");
        let neutral = entry_with(10, 5, 50.0, 0.01, "2026-01-01T00:00:00.000Z");
        let high = entry_with(10, 5, 80.0, 0.01, "2026-01-01T00:00:00.000Z");

        let low_base = quality_score(10, 5, 20.0);
        let neutral_base = quality_score(10, 5, 50.0);
        let high_base = quality_score(10, 5, 80.0);

        assert!((engine.score_at(&low, now).base_score - low_base * 0.9).abs() < 1e-9);
        assert!((engine.score_at(&neutral, now).base_score - neutral_base).abs() < 1e-9);
        assert!((engine.score_at(&high, now).base_score - high_base * 1.1).abs() < 1e-9);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Decay never reverses: more elapsed time, same inputs,
            /// never a higher final score.
            #[test]
            fn final_score_non_increasing_over_time(
                usage in 0i64..10_000,
                validations in 0i64..10_000,
                reputation in 0.0f64..100.0,
                decay_factor in 0.0001f64..0.1,
                days_a in 0i64..1000,
                extra_days in 0i64..1000,
            ) {
                let entry = entry_with(
                    usage,
                    validations,
                    reputation,
                    decay_factor,
                    "2026-01-01T00:00:00.000Z",
                );
                let start = parse("2026-01-01T00:00:00.000Z");
                let earlier = start + Duration::days(days_a);
                let later = earlier + Duration::days(extra_days);

                let engine = engine();
                let score_earlier = engine.score_at(&entry, earlier);
                let score_later = engine.score_at(&entry, later);

                prop_assert!(score_later.final_score <= score_earlier.final_score + 1e-9);
            }

            /// Base quality always stays on the 0-60 scale.
            #[test]
            fn quality_bounded(
                usage in 0i64..1_000_000,
                validations in 0i64..1_000_000,
                reputation in -50.0f64..200.0,
            ) {
                let q = quality_score(usage, validations, reputation);
                prop_assert!((0.0..=60.0).contains(&q));
            }
        }
    }
}
