// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background workers: queue consumers and periodic maintenance sweeps.
//!
//! Everything here is idempotent and row-scoped, so multiple worker
//! instances can run concurrently against the same database. Failures are
//! logged and retried through the queue's backoff; they never propagate
//! to the write path that enqueued the work.

use std::sync::Arc;

use engram_core::traits::{ProviderAdapter, TaskQueueAdapter};
use engram_core::EngramError;
use engram_config::EngramConfig;
use engram_storage::{queries, Database};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conflicts::{ArbitrationJob, ConflictDetector, ConflictResolver, ARBITRATION_QUEUE};
use crate::extractor::EntityExtractor;
use crate::governance::{GovernanceService, RetentionReport};
use crate::pools::PoolPromoter;
use crate::relations::RelationBuilder;
use crate::scoring::ScoringEngine;
use crate::vector::SqliteVectorStore;

/// Queue that post-write processing jobs are published to.
pub const POST_PROCESS_QUEUE: &str = "post_process";

/// Payload of a post-write processing job.
#[derive(Debug, Serialize, Deserialize)]
pub struct PostProcessJob {
    pub memory_id: String,
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceSummary {
    pub post_process_jobs: usize,
    pub arbitration_jobs: usize,
    pub scores_recomputed: usize,
    pub retention: RetentionReport,
    pub semantic_conflicts: usize,
    pub promotions: usize,
}

/// The background worker set for one database.
pub struct Workers {
    db: Database,
    config: EngramConfig,
    scoring: ScoringEngine,
    governance: GovernanceService,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    extractor: EntityExtractor,
    relations: RelationBuilder,
    promoter: PoolPromoter,
}

impl Workers {
    pub fn new(
        db: Database,
        config: EngramConfig,
        provider: Option<Arc<dyn ProviderAdapter>>,
        queue: Option<Arc<dyn TaskQueueAdapter>>,
    ) -> Self {
        let scoring = ScoringEngine::new(&config.scoring);
        let vector_store = Arc::new(SqliteVectorStore::new(db.clone()));
        let governance = GovernanceService::new(db.clone(), &config.governance);
        let detector = ConflictDetector::new(
            db.clone(),
            provider.clone(),
            config.anthropic.default_model.clone(),
            config.anthropic.max_tokens,
            config.conflicts.clone(),
        );
        let resolver = ConflictResolver::new(
            db.clone(),
            provider.clone(),
            queue,
            scoring.clone(),
            config.anthropic.default_model.clone(),
            config.anthropic.max_tokens,
            config.conflicts.clone(),
        );
        let extractor = EntityExtractor::new(
            provider.clone(),
            config.anthropic.default_model.clone(),
            config.anthropic.max_tokens,
        );
        let relations = RelationBuilder::new(
            db.clone(),
            vector_store,
            provider,
            config.anthropic.default_model.clone(),
            config.anthropic.max_tokens,
            config.memory.clone(),
        );
        let promoter = PoolPromoter::new(db.clone(), config.pools.clone());

        Self {
            db,
            config,
            scoring,
            governance,
            detector,
            resolver,
            extractor,
            relations,
            promoter,
        }
    }

    /// Consume up to `max_jobs` post-write jobs: extract entities, link
    /// them, and build relations for the referenced memory.
    pub async fn drain_post_process(&self, max_jobs: usize) -> Result<usize, EngramError> {
        let mut handled = 0;
        while handled < max_jobs {
            let Some(job) = queries::queue::dequeue(&self.db, POST_PROCESS_QUEUE).await? else {
                break;
            };

            match self.post_process(&job.payload).await {
                Ok(()) => queries::queue::ack(&self.db, job.id).await?,
                Err(e) => {
                    warn!(job = job.id, "post-processing failed, will retry: {e}");
                    queries::queue::fail(&self.db, job.id).await?;
                }
            }
            handled += 1;
        }
        Ok(handled)
    }

    async fn post_process(&self, payload: &str) -> Result<(), EngramError> {
        let job: PostProcessJob = serde_json::from_str(payload)
            .map_err(|e| EngramError::Internal(format!("bad post-process payload: {e}")))?;

        let Some(entry) = queries::entries::get_entry(&self.db, &job.memory_id).await? else {
            debug!(memory_id = job.memory_id, "post-process target vanished, dropping job");
            return Ok(());
        };

        let extraction = self.extractor.extract(&entry.content).await;
        self.relations.tag_entities(&entry, &extraction).await?;
        self.relations.build_relations(&entry.id).await?;
        Ok(())
    }

    /// Consume up to `max_jobs` arbitration jobs.
    pub async fn drain_arbitration(&self, max_jobs: usize) -> Result<usize, EngramError> {
        let mut handled = 0;
        while handled < max_jobs {
            let Some(job) = queries::queue::dequeue(&self.db, ARBITRATION_QUEUE).await? else {
                break;
            };

            let outcome = match serde_json::from_str::<ArbitrationJob>(&job.payload) {
                Ok(parsed) => self.resolver.arbitrate(&parsed.conflict_id).await,
                Err(e) => Err(EngramError::Internal(format!("bad arbitration payload: {e}"))),
            };

            match outcome {
                Ok(_) => queries::queue::ack(&self.db, job.id).await?,
                Err(e) => {
                    warn!(job = job.id, "arbitration failed, will retry: {e}");
                    queries::queue::fail(&self.db, job.id).await?;
                }
            }
            handled += 1;
        }
        Ok(handled)
    }

    /// Recompute cached scores that are missing or older than the
    /// configured staleness window.
    pub async fn run_score_sweep(&self) -> Result<usize, EngramError> {
        let cutoff = (chrono::Utc::now()
            - chrono::Duration::seconds(self.config.scoring.stale_after_secs as i64))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();

        let stale = queries::scores::stale_entries(&self.db, &cutoff, 1000).await?;
        let count = stale.len();
        for entry in stale {
            let score = self.scoring.score(&entry);
            queries::scores::upsert_score(&self.db, &entry.id, score).await?;
        }
        if count > 0 {
            debug!(count, "score sweep recomputed");
        }
        Ok(count)
    }

    /// Enforce retention policies across all organizations.
    pub async fn run_retention(&self) -> Result<RetentionReport, EngramError> {
        let mut total = RetentionReport::default();
        for org_id in queries::orgs::list_org_ids(&self.db).await? {
            let report = self.governance.enforce_retention(&org_id).await?;
            total.expired_by_age += report.expired_by_age;
            total.trimmed_by_count += report.trimmed_by_count;
            total.logged_only += report.logged_only;
        }
        Ok(total)
    }

    /// Run the batched semantic conflict scan across all organizations.
    pub async fn run_semantic_scan(&self) -> Result<usize, EngramError> {
        let mut recorded = 0;
        for org_id in queries::orgs::list_org_ids(&self.db).await? {
            recorded += self.detector.semantic_scan(&org_id).await?;
        }
        Ok(recorded)
    }

    /// Run the promotion-eligibility scan.
    pub async fn run_promotion(&self) -> Result<usize, EngramError> {
        self.promoter.promote_eligible().await
    }

    /// One full maintenance pass: drain both queues, then run every
    /// periodic sweep once.
    pub async fn run_maintenance_once(&self) -> Result<MaintenanceSummary, EngramError> {
        let post_process_jobs = self.drain_post_process(100).await?;
        let arbitration_jobs = self.drain_arbitration(100).await?;
        let scores_recomputed = self.run_score_sweep().await?;
        let retention = self.run_retention().await?;
        let semantic_conflicts = self.run_semantic_scan().await?;
        let promotions = self.run_promotion().await?;

        let summary = MaintenanceSummary {
            post_process_jobs,
            arbitration_jobs,
            scores_recomputed,
            retention,
            semantic_conflicts,
            promotions,
        };
        info!(
            post_process = summary.post_process_jobs,
            arbitration = summary.arbitration_jobs,
            scores = summary.scores_recomputed,
            expired = summary.retention.expired_by_age,
            trimmed = summary.retention.trimmed_by_count,
            conflicts = summary.semantic_conflicts,
            promotions = summary.promotions,
            "maintenance pass complete"
        );
        Ok(summary)
    }

    /// Spawn the long-running worker loops on their configured intervals.
    /// Used by `engram serve`; loops run until the process exits.
    pub fn spawn_all(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let intervals = self.config.workers.clone();
        let mut handles = Vec::new();

        handles.push(spawn_loop(
            "queues",
            intervals.queue_poll_interval_secs,
            self.clone(),
            |workers| async move {
                workers.drain_post_process(50).await?;
                workers.drain_arbitration(50).await?;
                Ok(())
            },
        ));
        handles.push(spawn_loop(
            "score-sweep",
            intervals.score_interval_secs,
            self.clone(),
            |workers| async move { workers.run_score_sweep().await.map(|_| ()) },
        ));
        handles.push(spawn_loop(
            "retention",
            intervals.retention_interval_secs,
            self.clone(),
            |workers| async move { workers.run_retention().await.map(|_| ()) },
        ));
        handles.push(spawn_loop(
            "semantic-scan",
            intervals.semantic_scan_interval_secs,
            self.clone(),
            |workers| async move { workers.run_semantic_scan().await.map(|_| ()) },
        ));
        handles.push(spawn_loop(
            "promotion",
            intervals.promotion_interval_secs,
            self,
            |workers| async move { workers.run_promotion().await.map(|_| ()) },
        ));

        handles
    }
}

fn spawn_loop<F, Fut>(
    name: &'static str,
    interval_secs: u64,
    workers: Arc<Workers>,
    run: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<Workers>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<(), EngramError>> + Send,
{
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = run(workers.clone()).await {
                warn!(worker = name, "worker iteration failed: {e}");
            }
        }
    })
}
