// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conflict detection and policy-driven resolution.
//!
//! Structural claim-mismatch detection happens inside the write
//! transaction (`engram-storage::queries::entries`); this module adds the
//! periodic model-based semantic scan and the five resolution strategies.
//! The semantic scan batches pairs per model request and sleeps between
//! batches to respect provider rate limits.

use std::sync::Arc;

use engram_core::traits::{ProviderAdapter, TaskQueueAdapter};
use engram_core::types::{
    ConflictStatus, ConflictType, JobOptions, MemoryConflict, MemoryEntry, ProviderMessage,
    ProviderRequest,
};
use engram_core::EngramError;
use engram_config::model::ConflictConfig;
use engram_storage::{queries, Database};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::scoring::ScoringEngine;

/// Queue that arbitration jobs are published to.
pub const ARBITRATION_QUEUE: &str = "arbitration";

/// Prompt for the batched semantic contradiction check.
const CONTRADICTION_PROMPT: &str = r#"For each numbered pair of memories below, judge whether the two statements contradict each other.

{pairs}

Return a JSON array with one object per pair:
[{"pair": <number>, "contradicts": <true|false>, "confidence": <0.0-1.0>, "explanation": "<one sentence>"}]

Output the JSON array only:"#;

/// Prompt for model-based arbitration of one conflict.
const ARBITRATION_PROMPT: &str = r#"Two memories are in conflict. Decide which one should win.

FIRST: {first}

SECOND: {second}

Return a single JSON object:
{"winner": "first" | "second", "explanation": "<one sentence>"}

Output the JSON only:"#;

/// How a conflict may be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Newer `created_at` wins.
    LatestWins,
    /// Higher confidence wins; falls back to arbitration below the
    /// configured confidence gap.
    ConfidenceWins,
    /// Higher cached final score wins. The default when no policy exists.
    ScoreWins,
    /// Hand off to the asynchronous arbitration worker.
    QueueArbitration,
    /// Leave pending for a human.
    ManualReview,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::LatestWins => "latest-wins",
            ResolutionStrategy::ConfidenceWins => "confidence-wins",
            ResolutionStrategy::ScoreWins => "score-wins",
            ResolutionStrategy::QueueArbitration => "queue-arbitration",
            ResolutionStrategy::ManualReview => "manual-review",
        }
    }

    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "latest-wins" => Some(ResolutionStrategy::LatestWins),
            "confidence-wins" => Some(ResolutionStrategy::ConfidenceWins),
            "score-wins" => Some(ResolutionStrategy::ScoreWins),
            "queue-arbitration" => Some(ResolutionStrategy::QueueArbitration),
            "manual-review" => Some(ResolutionStrategy::ManualReview),
            _ => None,
        }
    }
}

/// What happened when a resolution was attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Resolved { winning_id: String },
    Queued,
    LeftPending,
    Ignored,
}

/// Payload of an arbitration job.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArbitrationJob {
    pub conflict_id: String,
}

#[derive(Debug, Deserialize)]
struct PairVerdict {
    pair: usize,
    #[serde(default)]
    contradicts: bool,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    explanation: String,
}

#[derive(Debug, Deserialize)]
struct ArbitrationVerdict {
    winner: String,
    #[serde(default)]
    explanation: String,
}

/// Periodic model-based contradiction scanning.
pub struct ConflictDetector {
    db: Database,
    provider: Option<Arc<dyn ProviderAdapter>>,
    model: String,
    max_tokens: u32,
    config: ConflictConfig,
}

impl ConflictDetector {
    pub fn new(
        db: Database,
        provider: Option<Arc<dyn ProviderAdapter>>,
        model: String,
        max_tokens: u32,
        config: ConflictConfig,
    ) -> Self {
        Self {
            db,
            provider,
            model,
            max_tokens,
            config,
        }
    }

    /// Scan the organization's strategic pool for semantic
    /// contradictions. Returns the number of conflicts recorded.
    ///
    /// Without a provider the scan is skipped (claim-mismatch detection
    /// still runs on every write).
    pub async fn semantic_scan(&self, org_id: &str) -> Result<usize, EngramError> {
        let Some(provider) = &self.provider else {
            warn!(org_id, "semantic conflict scan skipped: no provider configured");
            return Ok(0);
        };

        let candidates = queries::entries::strategic_pool(
            &self.db,
            org_id,
            self.config.semantic_min_confidence,
            self.config.semantic_min_usage,
            self.config.semantic_max_age_days,
        )
        .await?;
        if candidates.len() < 2 {
            return Ok(0);
        }

        let pairs = candidate_pairs(&candidates);
        debug!(org_id, candidates = candidates.len(), pairs = pairs.len(), "semantic scan");

        let mut recorded = 0;
        for (batch_index, batch) in pairs.chunks(self.config.semantic_batch_size).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(
                    self.config.semantic_batch_delay_ms,
                ))
                .await;
            }

            let request = ProviderRequest {
                model: self.model.clone(),
                system_prompt: None,
                messages: vec![ProviderMessage {
                    role: "user".to_string(),
                    content: CONTRADICTION_PROMPT.replace("{pairs}", &format_pairs(batch)),
                }],
                max_tokens: self.max_tokens,
            };

            let response = match provider.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(org_id, batch_index, "semantic scan batch failed: {e}");
                    continue;
                }
            };

            for verdict in parse_pair_verdicts(&response.content) {
                if !verdict.contradicts
                    || verdict.confidence < self.config.semantic_confidence_floor
                {
                    continue;
                }
                let Some((first, second)) = batch.get(verdict.pair.wrapping_sub(1)) else {
                    continue;
                };
                // insert_conflict suppresses pairs that already carry a
                // conflict, which also gives claim mismatches precedence.
                if queries::conflicts::insert_conflict(
                    &self.db,
                    org_id,
                    &first.id,
                    &second.id,
                    ConflictType::SemanticContradiction,
                )
                .await?
                .is_some()
                {
                    recorded += 1;
                    debug!(
                        first = first.id,
                        second = second.id,
                        "semantic contradiction: {}",
                        verdict.explanation
                    );
                }
            }
        }

        if recorded > 0 {
            metrics::counter!("engram_conflicts_detected").increment(recorded as u64);
            info!(org_id, recorded, "semantic scan recorded conflicts");
        }
        Ok(recorded)
    }
}

/// All unordered candidate pairs.
fn candidate_pairs(entries: &[MemoryEntry]) -> Vec<(MemoryEntry, MemoryEntry)> {
    let mut pairs = Vec::new();
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            pairs.push((entries[i].clone(), entries[j].clone()));
        }
    }
    pairs
}

fn format_pairs(batch: &[(MemoryEntry, MemoryEntry)]) -> String {
    batch
        .iter()
        .enumerate()
        .map(|(i, (a, b))| format!("PAIR {}:\nA: {}\nB: {}", i + 1, a.content, b.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn parse_pair_verdicts(response: &str) -> Vec<PairVerdict> {
    let trimmed = response.trim();
    let Some(start) = trimmed.find('[') else {
        return Vec::new();
    };
    let Some(end) = trimmed.rfind(']') else {
        return Vec::new();
    };
    serde_json::from_str(&trimmed[start..=end]).unwrap_or_default()
}

/// Applies resolution strategies to conflicts.
pub struct ConflictResolver {
    db: Database,
    provider: Option<Arc<dyn ProviderAdapter>>,
    queue: Option<Arc<dyn TaskQueueAdapter>>,
    scoring: ScoringEngine,
    model: String,
    max_tokens: u32,
    config: ConflictConfig,
}

impl ConflictResolver {
    pub fn new(
        db: Database,
        provider: Option<Arc<dyn ProviderAdapter>>,
        queue: Option<Arc<dyn TaskQueueAdapter>>,
        scoring: ScoringEngine,
        model: String,
        max_tokens: u32,
        config: ConflictConfig,
    ) -> Self {
        Self {
            db,
            provider,
            queue,
            scoring,
            model,
            max_tokens,
            config,
        }
    }

    /// Apply a strategy to an open conflict.
    pub async fn resolve(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
    ) -> Result<ResolutionOutcome, EngramError> {
        let conflict = self.open_conflict(conflict_id).await?;

        let first = queries::entries::get_entry(&self.db, &conflict.first_id).await?;
        let second = queries::entries::get_entry(&self.db, &conflict.second_id).await?;
        let (first, second) = match (first, second) {
            (Some(first), Some(second)) => (first, second),
            (Some(survivor), None) | (None, Some(survivor)) => {
                // One side was hard-archived; the survivor wins by default.
                queries::conflicts::resolve_conflict(
                    &self.db,
                    conflict_id,
                    &survivor.id,
                    "system",
                    "counterpart no longer exists",
                )
                .await?;
                return Ok(ResolutionOutcome::Resolved {
                    winning_id: survivor.id,
                });
            }
            (None, None) => {
                queries::conflicts::set_status(&self.db, conflict_id, ConflictStatus::Ignored)
                    .await?;
                return Ok(ResolutionOutcome::Ignored);
            }
        };

        match strategy {
            ResolutionStrategy::LatestWins => {
                let winner = if second.created_at >= first.created_at {
                    &second
                } else {
                    &first
                };
                self.settle(
                    conflict_id,
                    &winner.id,
                    strategy,
                    format!("newer entry ({})", winner.created_at),
                )
                .await
            }
            ResolutionStrategy::ConfidenceWins => {
                let delta = (first.confidence - second.confidence).abs();
                if delta < self.config.min_confidence_delta {
                    debug!(
                        conflict_id,
                        delta, "confidence gap below threshold, queueing arbitration"
                    );
                    return self.queue_arbitration(conflict_id).await;
                }
                let winner = if first.confidence >= second.confidence {
                    &first
                } else {
                    &second
                };
                self.settle(
                    conflict_id,
                    &winner.id,
                    strategy,
                    format!("higher confidence ({:.2})", winner.confidence),
                )
                .await
            }
            ResolutionStrategy::ScoreWins => {
                let first_score = self.final_score(&first).await?;
                let second_score = self.final_score(&second).await?;
                let winner = if first_score >= second_score {
                    &first
                } else {
                    &second
                };
                self.settle(
                    conflict_id,
                    &winner.id,
                    strategy,
                    format!(
                        "higher final score ({:.1} vs {:.1})",
                        first_score.max(second_score),
                        first_score.min(second_score)
                    ),
                )
                .await
            }
            ResolutionStrategy::QueueArbitration => self.queue_arbitration(conflict_id).await,
            ResolutionStrategy::ManualReview => Ok(ResolutionOutcome::LeftPending),
        }
    }

    /// Model-assisted resolution, called by the arbitration worker.
    ///
    /// Without a provider (or on an unusable verdict) the conflict goes
    /// back to `pending` so a human or a later worker can pick it up.
    pub async fn arbitrate(&self, conflict_id: &str) -> Result<ResolutionOutcome, EngramError> {
        let conflict = self.open_conflict(conflict_id).await?;

        let Some(provider) = &self.provider else {
            warn!(conflict_id, "arbitration without provider, returning to pending");
            queries::conflicts::set_status(&self.db, conflict_id, ConflictStatus::Pending).await?;
            return Ok(ResolutionOutcome::LeftPending);
        };

        let first = queries::entries::get_entry(&self.db, &conflict.first_id).await?;
        let second = queries::entries::get_entry(&self.db, &conflict.second_id).await?;
        let (Some(first), Some(second)) = (first, second) else {
            queries::conflicts::set_status(&self.db, conflict_id, ConflictStatus::Ignored).await?;
            return Ok(ResolutionOutcome::Ignored);
        };

        let request = ProviderRequest {
            model: self.model.clone(),
            system_prompt: None,
            messages: vec![ProviderMessage {
                role: "user".to_string(),
                content: ARBITRATION_PROMPT
                    .replace("{first}", &first.content)
                    .replace("{second}", &second.content),
            }],
            max_tokens: self.max_tokens,
        };

        let verdict = match provider.complete(request).await {
            Ok(response) => parse_arbitration_verdict(&response.content),
            Err(e) => {
                warn!(conflict_id, "arbitration call failed: {e}");
                None
            }
        };

        match verdict {
            Some(verdict) => {
                let winner = if verdict.winner.eq_ignore_ascii_case("second") {
                    &second
                } else {
                    &first
                };
                queries::conflicts::resolve_conflict(
                    &self.db,
                    conflict_id,
                    &winner.id,
                    "arbitration:model",
                    &verdict.explanation,
                )
                .await?;
                Ok(ResolutionOutcome::Resolved {
                    winning_id: winner.id.clone(),
                })
            }
            None => {
                queries::conflicts::set_status(&self.db, conflict_id, ConflictStatus::Pending)
                    .await?;
                Ok(ResolutionOutcome::LeftPending)
            }
        }
    }

    /// Mark a conflict ignored.
    pub async fn ignore(&self, conflict_id: &str) -> Result<(), EngramError> {
        self.open_conflict(conflict_id).await?;
        queries::conflicts::set_status(&self.db, conflict_id, ConflictStatus::Ignored).await
    }

    async fn open_conflict(&self, conflict_id: &str) -> Result<MemoryConflict, EngramError> {
        let conflict = queries::conflicts::get_conflict(&self.db, conflict_id)
            .await?
            .ok_or_else(|| EngramError::NotFound {
                kind: "conflict",
                id: conflict_id.to_string(),
            })?;
        match conflict.status {
            ConflictStatus::Pending | ConflictStatus::Queued => Ok(conflict),
            status => Err(EngramError::Internal(format!(
                "conflict {conflict_id} is already {}",
                status.as_str()
            ))),
        }
    }

    async fn settle(
        &self,
        conflict_id: &str,
        winning_id: &str,
        strategy: ResolutionStrategy,
        explanation: String,
    ) -> Result<ResolutionOutcome, EngramError> {
        queries::conflicts::resolve_conflict(
            &self.db,
            conflict_id,
            winning_id,
            &format!("strategy:{}", strategy.as_str()),
            &explanation,
        )
        .await?;
        metrics::counter!("engram_conflicts_resolved").increment(1);
        Ok(ResolutionOutcome::Resolved {
            winning_id: winning_id.to_string(),
        })
    }

    async fn queue_arbitration(
        &self,
        conflict_id: &str,
    ) -> Result<ResolutionOutcome, EngramError> {
        let Some(queue) = &self.queue else {
            warn!(conflict_id, "no task queue configured, leaving conflict pending");
            return Ok(ResolutionOutcome::LeftPending);
        };

        let payload = serde_json::to_string(&ArbitrationJob {
            conflict_id: conflict_id.to_string(),
        })
        .map_err(|e| EngramError::Internal(format!("arbitration payload: {e}")))?;

        match queue.enqueue(ARBITRATION_QUEUE, &payload, JobOptions::default()).await {
            Ok(_) => {
                queries::conflicts::set_status(&self.db, conflict_id, ConflictStatus::Queued)
                    .await?;
                Ok(ResolutionOutcome::Queued)
            }
            Err(e) => {
                warn!(conflict_id, "arbitration enqueue failed, leaving pending: {e}");
                Ok(ResolutionOutcome::LeftPending)
            }
        }
    }

    async fn final_score(&self, entry: &MemoryEntry) -> Result<f64, EngramError> {
        if let Some(score) = queries::scores::get_score(&self.db, &entry.id).await? {
            return Ok(score.final_score);
        }
        let score = self.scoring.score(entry);
        queries::scores::upsert_score(&self.db, &entry.id, score).await?;
        Ok(score.final_score)
    }
}

fn parse_arbitration_verdict(response: &str) -> Option<ArbitrationVerdict> {
    let trimmed = response.trim();
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')? + 1;
    let verdict: ArbitrationVerdict = serde_json::from_str(&trimmed[start..end]).ok()?;
    if verdict.winner.eq_ignore_ascii_case("first") || verdict.winner.eq_ignore_ascii_case("second")
    {
        Some(verdict)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engram_config::model::ScoringConfig;
    use engram_core::types::MemoryScore;
    use engram_storage::SqliteTaskQueue;
    use engram_test_utils::harness::{make_entry, seeded_db};
    use engram_test_utils::MockProvider;

    fn resolver(
        db: Database,
        provider: Option<Arc<dyn ProviderAdapter>>,
        queue: Option<Arc<dyn TaskQueueAdapter>>,
    ) -> ConflictResolver {
        ConflictResolver::new(
            db,
            provider,
            queue,
            ScoringEngine::new(&ScoringConfig::default()),
            "test-model".to_string(),
            512,
            ConflictConfig::default(),
        )
    }

    async fn seed_conflict(db: &Database) -> String {
        let mut a = make_entry("a", "acme/eng");
        a.created_at = "2026-01-01T00:00:00.000Z".to_string();
        a.confidence = 0.9;
        queries::entries::insert_entry_with_quota(db, &a).await.unwrap();

        let mut b = make_entry("b", "acme/eng");
        b.created_at = "2026-02-01T00:00:00.000Z".to_string();
        b.confidence = 0.5;
        queries::entries::insert_entry_with_quota(db, &b).await.unwrap();

        queries::conflicts::insert_conflict(db, "acme", "a", "b", ConflictType::ClaimMismatch)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn latest_wins_picks_newer() {
        let db = seeded_db().await;
        let conflict_id = seed_conflict(&db).await;

        let outcome = resolver(db.clone(), None, None)
            .resolve(&conflict_id, ResolutionStrategy::LatestWins)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ResolutionOutcome::Resolved {
                winning_id: "b".to_string()
            }
        );

        let conflict = queries::conflicts::get_conflict(&db, &conflict_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conflict.status, ConflictStatus::Resolved);
        assert_eq!(conflict.resolved_by.as_deref(), Some("strategy:latest-wins"));
    }

    #[tokio::test]
    async fn confidence_wins_with_clear_gap() {
        let db = seeded_db().await;
        let conflict_id = seed_conflict(&db).await;

        let outcome = resolver(db, None, None)
            .resolve(&conflict_id, ResolutionStrategy::ConfidenceWins)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ResolutionOutcome::Resolved {
                winning_id: "a".to_string()
            }
        );
    }

    #[tokio::test]
    async fn confidence_tie_falls_back_to_arbitration_queue() {
        let db = seeded_db().await;

        let mut a = make_entry("a", "acme/eng");
        a.confidence = 0.80;
        queries::entries::insert_entry_with_quota(&db, &a).await.unwrap();
        let mut b = make_entry("b", "acme/eng");
        b.confidence = 0.85;
        queries::entries::insert_entry_with_quota(&db, &b).await.unwrap();
        let conflict_id =
            queries::conflicts::insert_conflict(&db, "acme", "a", "b", ConflictType::ClaimMismatch)
                .await
                .unwrap()
                .unwrap();

        let queue: Arc<dyn TaskQueueAdapter> = Arc::new(SqliteTaskQueue::new(db.clone()));
        let outcome = resolver(db.clone(), None, Some(queue))
            .resolve(&conflict_id, ResolutionStrategy::ConfidenceWins)
            .await
            .unwrap();
        assert_eq!(outcome, ResolutionOutcome::Queued);

        let conflict = queries::conflicts::get_conflict(&db, &conflict_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conflict.status, ConflictStatus::Queued);

        let job = queries::queue::dequeue(&db, ARBITRATION_QUEUE).await.unwrap().unwrap();
        let parsed: ArbitrationJob = serde_json::from_str(&job.payload).unwrap();
        assert_eq!(parsed.conflict_id, conflict_id);
    }

    #[tokio::test]
    async fn confidence_tie_without_queue_stays_pending() {
        let db = seeded_db().await;

        let mut a = make_entry("a", "acme/eng");
        a.confidence = 0.80;
        queries::entries::insert_entry_with_quota(&db, &a).await.unwrap();
        let mut b = make_entry("b", "acme/eng");
        b.confidence = 0.82;
        queries::entries::insert_entry_with_quota(&db, &b).await.unwrap();
        let conflict_id =
            queries::conflicts::insert_conflict(&db, "acme", "a", "b", ConflictType::ClaimMismatch)
                .await
                .unwrap()
                .unwrap();

        let outcome = resolver(db.clone(), None, None)
            .resolve(&conflict_id, ResolutionStrategy::ConfidenceWins)
            .await
            .unwrap();
        assert_eq!(outcome, ResolutionOutcome::LeftPending);

        let conflict = queries::conflicts::get_conflict(&db, &conflict_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conflict.status, ConflictStatus::Pending);
    }

    #[tokio::test]
    async fn score_wins_uses_cached_final_scores() {
        let db = seeded_db().await;
        let conflict_id = seed_conflict(&db).await;

        queries::scores::upsert_score(
            &db,
            "a",
            MemoryScore {
                base_score: 45.0,
                decay_multiplier: 1.0,
                final_score: 45.0,
            },
        )
        .await
        .unwrap();
        queries::scores::upsert_score(
            &db,
            "b",
            MemoryScore {
                base_score: 20.0,
                decay_multiplier: 1.0,
                final_score: 20.0,
            },
        )
        .await
        .unwrap();

        let outcome = resolver(db.clone(), None, None)
            .resolve(&conflict_id, ResolutionStrategy::ScoreWins)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ResolutionOutcome::Resolved {
                winning_id: "a".to_string()
            }
        );

        let conflict = queries::conflicts::get_conflict(&db, &conflict_id)
            .await
            .unwrap()
            .unwrap();
        assert!(conflict.explanation.unwrap().contains("45.0"));
    }

    #[tokio::test]
    async fn manual_review_leaves_pending() {
        let db = seeded_db().await;
        let conflict_id = seed_conflict(&db).await;

        let outcome = resolver(db.clone(), None, None)
            .resolve(&conflict_id, ResolutionStrategy::ManualReview)
            .await
            .unwrap();
        assert_eq!(outcome, ResolutionOutcome::LeftPending);

        let conflict = queries::conflicts::get_conflict(&db, &conflict_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conflict.status, ConflictStatus::Pending);
    }

    #[tokio::test]
    async fn resolving_a_resolved_conflict_errors() {
        let db = seeded_db().await;
        let conflict_id = seed_conflict(&db).await;

        let r = resolver(db, None, None);
        r.resolve(&conflict_id, ResolutionStrategy::LatestWins).await.unwrap();
        let err = r
            .resolve(&conflict_id, ResolutionStrategy::LatestWins)
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::Internal(_)));
    }

    #[tokio::test]
    async fn arbitration_resolves_with_model_verdict() {
        let db = seeded_db().await;
        let conflict_id = seed_conflict(&db).await;
        queries::conflicts::set_status(&db, &conflict_id, ConflictStatus::Queued).await.unwrap();

        let provider: Arc<dyn ProviderAdapter> = Arc::new(MockProvider::with_responses(vec![
            r#"{"winner": "second", "explanation": "second entry reflects the current state"}"#
                .to_string(),
        ]));
        let outcome = resolver(db.clone(), Some(provider), None)
            .arbitrate(&conflict_id)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ResolutionOutcome::Resolved {
                winning_id: "b".to_string()
            }
        );

        let conflict = queries::conflicts::get_conflict(&db, &conflict_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conflict.resolved_by.as_deref(), Some("arbitration:model"));
    }

    #[tokio::test]
    async fn arbitration_without_provider_returns_to_pending() {
        let db = seeded_db().await;
        let conflict_id = seed_conflict(&db).await;
        queries::conflicts::set_status(&db, &conflict_id, ConflictStatus::Queued).await.unwrap();

        let outcome = resolver(db.clone(), None, None).arbitrate(&conflict_id).await.unwrap();
        assert_eq!(outcome, ResolutionOutcome::LeftPending);

        let conflict = queries::conflicts::get_conflict(&db, &conflict_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conflict.status, ConflictStatus::Pending);
    }

    #[tokio::test]
    async fn semantic_scan_records_contradictions() {
        let db = seeded_db().await;

        // Two strategic-pool entries: high confidence, frequent use.
        for (id, content) in [("a", "the database is postgres"), ("b", "the database is mongo")] {
            let mut entry = make_entry(id, "acme/eng");
            entry.content = content.to_string();
            entry.confidence = 0.9;
            entry.usage_count = 10;
            queries::entries::insert_entry_with_quota(&db, &entry).await.unwrap();
        }

        let provider: Arc<dyn ProviderAdapter> = Arc::new(MockProvider::with_responses(vec![
            r#"[{"pair": 1, "contradicts": true, "confidence": 0.92, "explanation": "different databases"}]"#
                .to_string(),
        ]));
        let detector = ConflictDetector::new(
            db.clone(),
            Some(provider),
            "test-model".to_string(),
            512,
            ConflictConfig::default(),
        );

        let recorded = detector.semantic_scan("acme").await.unwrap();
        assert_eq!(recorded, 1);

        let conflicts =
            queries::conflicts::list_conflicts(&db, "acme", Some(ConflictStatus::Pending), 10)
                .await
                .unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_type, ConflictType::SemanticContradiction);
    }

    #[tokio::test]
    async fn semantic_scan_respects_existing_claim_conflict() {
        let db = seeded_db().await;

        for (id, value) in [("a", "PostgreSQL"), ("b", "MongoDB")] {
            let mut entry = make_entry(id, "acme/eng");
            entry.confidence = 0.9;
            entry.usage_count = 10;
            entry.claim_key = Some("database".to_string());
            entry.claim_value = Some(value.to_string());
            queries::entries::insert_entry_with_quota(&db, &entry).await.unwrap();
        }
        // The write path already created a claim_mismatch for (a, b).

        let provider: Arc<dyn ProviderAdapter> = Arc::new(MockProvider::with_responses(vec![
            r#"[{"pair": 1, "contradicts": true, "confidence": 0.95, "explanation": "dup"}]"#
                .to_string(),
        ]));
        let detector = ConflictDetector::new(
            db.clone(),
            Some(provider),
            "test-model".to_string(),
            512,
            ConflictConfig::default(),
        );

        let recorded = detector.semantic_scan("acme").await.unwrap();
        assert_eq!(recorded, 0, "claim mismatch takes precedence over semantic duplicate");
    }

    #[tokio::test]
    async fn semantic_scan_skips_low_confidence_verdicts() {
        let db = seeded_db().await;
        for id in ["a", "b"] {
            let mut entry = make_entry(id, "acme/eng");
            entry.confidence = 0.9;
            entry.usage_count = 10;
            queries::entries::insert_entry_with_quota(&db, &entry).await.unwrap();
        }

        let provider: Arc<dyn ProviderAdapter> = Arc::new(MockProvider::with_responses(vec![
            r#"[{"pair": 1, "contradicts": true, "confidence": 0.4, "explanation": "unsure"}]"#
                .to_string(),
        ]));
        let detector = ConflictDetector::new(
            db.clone(),
            Some(provider),
            "test-model".to_string(),
            512,
            ConflictConfig::default(),
        );
        assert_eq!(detector.semantic_scan("acme").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn semantic_scan_without_provider_is_noop() {
        let db = seeded_db().await;
        let detector = ConflictDetector::new(
            db,
            None,
            "test-model".to_string(),
            512,
            ConflictConfig::default(),
        );
        assert_eq!(detector.semantic_scan("acme").await.unwrap(), 0);
    }

    #[test]
    fn strategy_string_roundtrip() {
        for strategy in [
            ResolutionStrategy::LatestWins,
            ResolutionStrategy::ConfidenceWins,
            ResolutionStrategy::ScoreWins,
            ResolutionStrategy::QueueArbitration,
            ResolutionStrategy::ManualReview,
        ] {
            assert_eq!(
                ResolutionStrategy::from_str_value(strategy.as_str()),
                Some(strategy)
            );
        }
        assert!(ResolutionStrategy::from_str_value("coin-flip").is_none());
    }

    #[test]
    fn pair_verdict_parsing_is_lenient() {
        assert!(parse_pair_verdicts("not json").is_empty());
        let verdicts = parse_pair_verdicts(
            "Here you go:\n[{\"pair\": 1, \"contradicts\": false, \"confidence\": 0.9}]",
        );
        assert_eq!(verdicts.len(), 1);
        assert_eq!(verdicts[0].pair, 1);
        assert!(!verdicts[0].contradicts);
    }
}
