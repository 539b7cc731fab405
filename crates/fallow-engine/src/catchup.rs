//! Missed-run catch-up.
//!
//! At startup, compares each schedule's most recent due occurrence with
//! its recorded last wipe and serially replays anything missed. Contention
//! on the single-flight flag re-queues the same world; it is never
//! skipped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{info, warn};

use fallow_schedule::{ScheduleRegistry, previous_occurrence};

use crate::orchestrator::WipeOrchestrator;
use crate::outcome::WipeOutcome;
use crate::scheduler::AutoScheduler;

/// Serial replayer for wipes missed while the process was down.
#[derive(Clone)]
pub struct CatchUp {
    registry: Arc<ScheduleRegistry>,
    orchestrator: Arc<WipeOrchestrator>,
    scheduler: Arc<AutoScheduler>,
    /// Delay between replay items (and between retries of a contended one).
    replay_delay: Duration,
}

impl CatchUp {
    pub fn new(
        registry: Arc<ScheduleRegistry>,
        orchestrator: Arc<WipeOrchestrator>,
        scheduler: Arc<AutoScheduler>,
        replay_delay: Duration,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            scheduler,
            replay_delay,
        }
    }

    /// Worlds whose most recent due occurrence is not covered by a
    /// recorded wipe.
    pub async fn missed_worlds(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut missed = Vec::new();
        for entry in self.registry.snapshot().await {
            let due = previous_occurrence(now, &entry.schedule);
            match entry.last_wipe {
                Some(last) if last >= due => {}
                _ => missed.push(entry.name.clone()),
            }
        }
        missed
    }

    /// Replay missed wipes one per delay tick, in order. A world rejected
    /// with `AlreadyInProgress` is retried at the same position; any other
    /// outcome advances. Returns once the queue drains (or scheduling is
    /// disabled).
    pub async fn run(&self) {
        if !self.scheduler.is_enabled() {
            return;
        }
        let missed = self.missed_worlds(Utc::now()).await;
        if missed.is_empty() {
            return;
        }
        info!(worlds = ?missed, "missed wipes detected, replaying");

        let mut index = 0;
        while index < missed.len() {
            sleep(self.replay_delay).await;
            if !self.scheduler.is_enabled() {
                return;
            }

            let report = self.orchestrator.execute_one(&missed[index]).await;
            if matches!(report.outcome, WipeOutcome::AlreadyInProgress) {
                // Transient contention: same index again next tick.
                continue;
            }
            if !report.success() {
                warn!(
                    world = %report.world,
                    outcome = ?report.outcome,
                    "catch-up wipe did not complete"
                );
            }
            index += 1;
        }
        info!(count = missed.len(), "catch-up replay drained");
    }
}
