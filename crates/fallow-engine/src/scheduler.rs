//! Automatic wipe scheduler.
//!
//! Keeps exactly one pending timer armed for the earliest due schedule;
//! worlds whose next occurrence ties for the earliest instant fire
//! together. Rearming cancels the pending timer and recomputes from the
//! current schedule set.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, watch};
use tokio::time::sleep;
use tracing::{info, warn};

use fallow_schedule::{ScheduleRegistry, next_occurrence};

use crate::hosts::WorldProvider;
use crate::orchestrator::WipeOrchestrator;

/// Snapshot of the next scheduled firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextRun {
    pub at: DateTime<Utc>,
    /// Every world whose next occurrence ties for `at`.
    pub worlds: Vec<String>,
}

/// The automatic scheduler.
pub struct AutoScheduler {
    registry: Arc<ScheduleRegistry>,
    orchestrator: Arc<WipeOrchestrator>,
    provider: Arc<dyn WorldProvider>,
    enabled: AtomicBool,
    next_run: RwLock<Option<NextRun>>,
    rearm_tx: watch::Sender<u32>,
}

impl AutoScheduler {
    pub fn new(
        registry: Arc<ScheduleRegistry>,
        orchestrator: Arc<WipeOrchestrator>,
        provider: Arc<dyn WorldProvider>,
        enabled: bool,
    ) -> Self {
        let (rearm_tx, _) = watch::channel(0);
        Self {
            registry,
            orchestrator,
            provider,
            enabled: AtomicBool::new(enabled),
            next_run: RwLock::new(None),
            rearm_tx,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub async fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        self.rearm().await;
    }

    /// The current next-run snapshot, if any timer is armed.
    pub async fn next_run(&self) -> Option<NextRun> {
        self.next_run.read().await.clone()
    }

    /// Cancel the pending timer, recompute the snapshot, and re-arm.
    pub async fn rearm(&self) {
        let next = self.compute_next_run().await;
        match &next {
            Some(run) => info!(at = %run.at, worlds = ?run.worlds, "next scheduled wipe armed"),
            None => info!("no scheduled wipe armed"),
        }
        *self.next_run.write().await = next;
        self.rearm_tx.send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    /// Prune unreachable schedules, then find the earliest next occurrence
    /// and every world tying for it.
    async fn compute_next_run(&self) -> Option<NextRun> {
        let snapshot = self.registry.snapshot().await;

        // Worlds that are neither loaded, loadable, nor regenerating can
        // never complete a wipe again; drop their schedules.
        let mut pruned: Vec<String> = Vec::new();
        for entry in &snapshot {
            let name = entry.name.as_str();
            if self.provider.is_loaded(name) || self.provider.is_loadable(name) {
                continue;
            }
            if self.orchestrator.effective_regenerate(name).await {
                continue;
            }
            if self.registry.remove(name).await {
                warn!(world = name, "removed schedule: world is gone and will not regenerate");
                pruned.push(entry.name.clone());
            }
        }

        if !self.is_enabled() {
            return None;
        }

        let now = Utc::now();
        let mut earliest: Option<DateTime<Utc>> = None;
        let mut worlds: Vec<String> = Vec::new();
        for entry in snapshot
            .iter()
            .filter(|entry| !pruned.contains(&entry.name))
        {
            let next = next_occurrence(now, &entry.schedule);
            match earliest {
                None => {
                    earliest = Some(next);
                    worlds.push(entry.name.clone());
                }
                Some(at) if next < at => {
                    earliest = Some(next);
                    worlds.clear();
                    worlds.push(entry.name.clone());
                }
                Some(at) if next == at => worlds.push(entry.name.clone()),
                Some(_) => {}
            }
        }

        earliest.map(|at| NextRun { at, worlds })
    }

    /// Timer-owner loop: sleep until the armed instant, fire the wipe,
    /// rearm, repeat. Rearms and shutdown both cancel the pending sleep.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!("automatic wipe scheduler started");

        let mut rearm_rx = self.rearm_tx.subscribe();
        self.rearm().await;
        let _ = rearm_rx.borrow_and_update();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let armed = self.next_run.read().await.clone();
            match armed {
                Some(run) => {
                    let delay = (run.at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tokio::select! {
                        biased;

                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }

                        _ = rearm_rx.changed() => {
                            // Snapshot replaced; sleep against the new one.
                        }

                        _ = sleep(delay) => {
                            info!(worlds = ?run.worlds, "scheduled wipe fired");
                            let reports = self.orchestrator.execute(&run.worlds).await;
                            for report in &reports {
                                if !report.success() {
                                    warn!(
                                        world = %report.world,
                                        outcome = ?report.outcome,
                                        "scheduled wipe did not complete"
                                    );
                                }
                            }
                            // Rearm after every tick, success or not.
                            self.rearm().await;
                            let _ = rearm_rx.borrow_and_update();
                        }
                    }
                }
                None => {
                    tokio::select! {
                        biased;

                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }

                        _ = rearm_rx.changed() => {}
                    }
                }
            }
        }

        info!("automatic wipe scheduler stopped");
    }
}
