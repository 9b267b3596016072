//! Sweeps run after every processed creation event.
//!
//! - **Age sweep** (always): images in history unseen for longer than the
//!   retention window go through the deletion engine.
//! - **Dangling sweep** (if enabled): the runtime prunes untagged,
//!   unreferenced images. History is not involved.
//! - **Grandfather sweep** (enforcing only, after warm-up): images the
//!   runtime holds but history has never seen go through the deletion engine.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::history::ImageHistory;
use crate::policy::{DeletionEngine, DeletionOutcome, PolicyConfig};
use crate::runtime::{ImageRuntime, PruneReport};

/// Tally of one engine-driven sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Images handed to the deletion engine.
    pub examined: usize,
    /// Images confirmed gone.
    pub deleted: usize,
    /// Images left in place.
    pub skipped: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: DeletionOutcome) {
        self.examined += 1;
        if outcome.is_gone() {
            self.deleted += 1;
        } else {
            self.skipped += 1;
        }
    }
}

/// Results of all sweeps run for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub age: SweepReport,
    /// `None` when dangling pruning is disabled or failed.
    pub dangling: Option<PruneReport>,
    /// `None` when the grandfather sweep did not run.
    pub grandfather: Option<SweepReport>,
}

/// Schedules and runs the three sweeps.
pub struct SweepScheduler {
    runtime: Arc<dyn ImageRuntime>,
    engine: DeletionEngine,
    policy: Arc<PolicyConfig>,
    started_at: i64,
}

impl SweepScheduler {
    /// Create a scheduler for a process that started at `started_at`.
    pub fn new(runtime: Arc<dyn ImageRuntime>, policy: Arc<PolicyConfig>, started_at: i64) -> Self {
        Self {
            engine: DeletionEngine::new(Arc::clone(&runtime), Arc::clone(&policy)),
            runtime,
            policy,
            started_at,
        }
    }

    pub fn engine(&self) -> &DeletionEngine {
        &self.engine
    }

    /// Run every sweep whose trigger condition holds at `now`.
    pub async fn run(&self, history: &mut ImageHistory, now: i64) -> SweepSummary {
        let age = self.age_sweep(history, now).await;

        let dangling = if self.policy.prune_dangling {
            self.dangling_sweep().await
        } else {
            None
        };

        let grandfather = if self.grandfather_due(now) {
            Some(self.grandfather_sweep(history).await)
        } else {
            None
        };

        SweepSummary {
            age,
            dangling,
            grandfather,
        }
    }

    /// Try to delete every history entry last seen before `now - retention`.
    pub async fn age_sweep(&self, history: &mut ImageHistory, now: i64) -> SweepReport {
        let cutoff = now.saturating_sub(self.policy.retention());
        let candidates = history.seen_before(cutoff);
        let mut report = SweepReport::default();

        debug!(
            tracked = history.len(),
            candidates = candidates.len(),
            cutoff,
            "Searching for old images"
        );

        for id in candidates {
            info!(
                image_id = %id,
                last_seen = ?history.last_seen(&id),
                "Image is older than retention window, trying to delete"
            );
            let outcome = self.engine.try_delete(history, &id).await;
            report.record(outcome);
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                deleted = report.deleted,
                skipped = report.skipped,
                "Age sweep finished"
            );
        }
        report
    }

    /// Ask the runtime to prune dangling images.
    pub async fn dangling_sweep(&self) -> Option<PruneReport> {
        match self.runtime.prune_dangling().await {
            Ok(report) => {
                info!(
                    images_deleted = report.images_deleted,
                    space_reclaimed = report.space_reclaimed,
                    "Pruned dangling images"
                );
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Dangling image prune failed");
                None
            }
        }
    }

    /// True once enforcing mode has been running for a full retention window.
    pub fn grandfather_due(&self, now: i64) -> bool {
        self.policy.enforcing && now > self.started_at.saturating_add(self.policy.retention())
    }

    /// Try to delete every runtime image that history has never seen.
    pub async fn grandfather_sweep(&self, history: &mut ImageHistory) -> SweepReport {
        let mut report = SweepReport::default();

        let images = match self.runtime.list_images().await {
            Ok(images) => images,
            Err(e) => {
                warn!(error = %e, "Failed to list images, skipping grandfather sweep");
                return report;
            }
        };

        for id in images {
            if history.contains(&id) {
                continue;
            }
            info!(image_id = %id, "Image was never seen in an event, trying to delete");
            let outcome = self.engine.try_delete(history, &id).await;
            report.record(outcome);
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                deleted = report.deleted,
                skipped = report.skipped,
                "Grandfather sweep finished"
            );
        }
        report
    }
}
