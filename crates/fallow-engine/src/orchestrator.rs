//! Single-flight wipe state machine.
//!
//! Executes one wipe (or batch) to completion: evacuate occupants, retry
//! cleanup until the world is empty and deleted, then regenerate or retire.
//! All failures become a [`WipeOutcome`] plus a log line; nothing escapes
//! as an error.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use fallow_schedule::ScheduleRegistry;
use fallow_tracking::OfflineTracker;

use crate::hosts::{Evacuation, EvacuationReport, Regeneration, WorldProvider};
use crate::lock::WipeLock;
use crate::outcome::{WipeOutcome, WipeReport};

/// Tunables for the cleanup retry loop and regeneration default.
#[derive(Debug, Clone)]
pub struct WipeSettings {
    /// Global regenerate-on-wipe default; per-world overrides win.
    pub regenerate_default: bool,
    /// Delay between cleanup checks.
    pub cleanup_interval: Duration,
    /// Shared attempt budget for occupancy checks and deletion retries.
    pub max_cleanup_attempts: u32,
}

impl Default for WipeSettings {
    fn default() -> Self {
        Self {
            regenerate_default: false,
            cleanup_interval: Duration::from_secs(1),
            max_cleanup_attempts: 15,
        }
    }
}

/// The wipe orchestrator.
pub struct WipeOrchestrator {
    registry: Arc<ScheduleRegistry>,
    tracker: Arc<OfflineTracker>,
    evacuation: Arc<dyn Evacuation>,
    regeneration: Arc<dyn Regeneration>,
    provider: Arc<dyn WorldProvider>,
    settings: WipeSettings,
    lock: WipeLock,
}

impl WipeOrchestrator {
    pub fn new(
        registry: Arc<ScheduleRegistry>,
        tracker: Arc<OfflineTracker>,
        evacuation: Arc<dyn Evacuation>,
        regeneration: Arc<dyn Regeneration>,
        provider: Arc<dyn WorldProvider>,
        settings: WipeSettings,
    ) -> Self {
        Self {
            registry,
            tracker,
            evacuation,
            regeneration,
            provider,
            settings,
            lock: WipeLock::new(),
        }
    }

    /// Whether a wipe currently holds the single-flight flag.
    pub fn is_wiping(&self) -> bool {
        self.lock.is_held()
    }

    /// Wipe a batch of worlds under one single-flight acquisition.
    ///
    /// Rejected immediately with `AlreadyInProgress` for every target when
    /// another wipe is running.
    pub async fn execute(&self, targets: &[String]) -> Vec<WipeReport> {
        let Some(_guard) = self.lock.try_acquire() else {
            warn!(?targets, "wipe rejected: another wipe is in progress");
            return targets
                .iter()
                .map(|world| WipeReport {
                    world: world.clone(),
                    outcome: WipeOutcome::AlreadyInProgress,
                })
                .collect();
        };

        let mut reports = Vec::with_capacity(targets.len());
        for target in targets {
            let outcome = self.wipe_target(target).await;
            reports.push(WipeReport {
                world: target.clone(),
                outcome,
            });
        }
        reports
    }

    /// Wipe a single world (manual/command path).
    pub async fn execute_one(&self, target: &str) -> WipeReport {
        let Some(_guard) = self.lock.try_acquire() else {
            warn!(world = target, "wipe rejected: another wipe is in progress");
            return WipeReport {
                world: target.to_string(),
                outcome: WipeOutcome::AlreadyInProgress,
            };
        };

        let outcome = self.wipe_target(target).await;
        WipeReport {
            world: target.to_string(),
            outcome,
        }
    }

    /// Preview the evacuation a wipe of `target` would perform.
    pub async fn preview(&self, target: &str) -> Option<EvacuationReport> {
        let destination = self.resolve_destination().await?;
        Some(self.evacuation.dry_run(target, &destination))
    }

    pub(crate) async fn effective_regenerate(&self, world: &str) -> bool {
        self.registry
            .regenerate_override(world)
            .await
            .unwrap_or(self.settings.regenerate_default)
    }

    /// One target through the full state machine. The single-flight flag is
    /// already held.
    async fn wipe_target(&self, target: &str) -> WipeOutcome {
        let target = target.trim();

        if self.registry.is_protected(target).await {
            info!(world = target, "skipping protected world");
            return WipeOutcome::Protected;
        }

        let Some(destination) = self.resolve_destination().await else {
            warn!(world = target, "wipe aborted: destination world unavailable");
            return WipeOutcome::DestinationUnresolved;
        };
        if destination.eq_ignore_ascii_case(target) {
            warn!(
                world = target,
                "wipe aborted: target is the destination world"
            );
            return WipeOutcome::TargetIsDestination;
        }

        let mut occupants_moved = 0;
        if self.provider.is_loaded(target) && self.provider.occupant_count(target) > 0 {
            let report = self.evacuation.relocate(target, &destination).await;
            occupants_moved = report.occupants_moved;
            info!(
                from = target,
                to = %destination,
                moved = report.occupants_moved,
                "evacuated occupants"
            );
        }

        if let Err(outcome) = self.cleanup(target).await {
            return outcome;
        }

        let wiped_at = Utc::now();
        if self.effective_regenerate(target).await {
            // Recorded before regeneration completes; a failed regeneration
            // does not unmark the wipe.
            self.registry.set_last_wipe(target, wiped_at).await;
            self.tracker.record_wipe(target, wiped_at);
            self.spawn_regeneration(target);
            info!(world = target, "world wiped, regeneration queued");
            WipeOutcome::Wiped { occupants_moved }
        } else {
            self.tracker.record_wipe(target, wiped_at);
            self.registry.remove(target).await;
            info!(world = target, "world wiped and retired");
            WipeOutcome::Retired { occupants_moved }
        }
    }

    /// Bounded-retry cleanup: wait for the world to empty, then unload and
    /// delete it. One attempt budget covers both occupancy checks and
    /// deletion retries.
    async fn cleanup(&self, target: &str) -> Result<(), WipeOutcome> {
        let mut attempts = 0u32;
        loop {
            sleep(self.settings.cleanup_interval).await;

            if self.provider.is_loaded(target) && self.provider.occupant_count(target) > 0 {
                attempts += 1;
                if attempts >= self.settings.max_cleanup_attempts {
                    warn!(world = target, attempts, "cleanup aborted: occupants never left");
                    return Err(WipeOutcome::CleanupTimeout);
                }
                continue;
            }

            if self.provider.is_loaded(target) && !self.evacuation.unload(target).await {
                debug!(world = target, "unload reported no change");
            }

            if self.evacuation.delete_from_disk(target).await {
                return Ok(());
            }

            attempts += 1;
            if attempts >= self.settings.max_cleanup_attempts {
                warn!(
                    world = target,
                    attempts, "cleanup aborted: world data could not be deleted"
                );
                return Err(WipeOutcome::DeleteFailed);
            }
        }
    }

    /// The primary protected world when loaded, else the server default.
    async fn resolve_destination(&self) -> Option<String> {
        let primary = self.registry.primary_protected().await;
        if self.provider.is_loaded(&primary) {
            return Some(primary);
        }
        self.provider.default_world()
    }

    /// Regeneration runs detached; its failure is logged, never rolled back
    /// into the wipe outcome.
    fn spawn_regeneration(&self, world: &str) {
        let regeneration = Arc::clone(&self.regeneration);
        let world = world.to_string();
        tokio::spawn(async move {
            if let Err(error) = regeneration.regenerate(&world, None).await {
                warn!(world = %world, error = %error, "regeneration failed after wipe");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeHost, fast_settings};
    use fallow_schedule::RawWorldEntry;
    use fallow_tracking::{OfflineTracker, TrackingConfig};
    use pretty_assertions::assert_eq;

    fn registry_with(worlds: &[&str], protected: &[&str]) -> Arc<ScheduleRegistry> {
        Arc::new(ScheduleRegistry::load(
            worlds
                .iter()
                .map(|w| (w.to_string(), RawWorldEntry::default())),
            protected.iter().map(|w| w.to_string()).collect(),
        ))
    }

    fn orchestrator(host: &Arc<FakeHost>, registry: Arc<ScheduleRegistry>) -> WipeOrchestrator {
        orchestrator_with(host, registry, fast_settings())
    }

    fn orchestrator_with(
        host: &Arc<FakeHost>,
        registry: Arc<ScheduleRegistry>,
        settings: WipeSettings,
    ) -> WipeOrchestrator {
        WipeOrchestrator::new(
            registry,
            Arc::new(OfflineTracker::new(TrackingConfig {
                persist: false,
                ..TrackingConfig::default()
            })),
            Arc::clone(host) as Arc<dyn Evacuation>,
            Arc::clone(host) as Arc<dyn Regeneration>,
            Arc::clone(host) as Arc<dyn WorldProvider>,
            settings,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn wipes_an_occupied_world_and_retires_it() {
        let host = FakeHost::new(&["default", "mining"]);
        host.set_occupants("mining", 3);
        let registry = registry_with(&["mining"], &["default"]);
        let orchestrator = orchestrator(&host, Arc::clone(&registry));

        let report = orchestrator.execute_one("mining").await;

        assert_eq!(report.outcome, WipeOutcome::Retired { occupants_moved: 3 });
        assert!(host.was_deleted("mining"));
        assert!(!host.is_loaded("mining"));
        // Retired worlds lose their schedule.
        assert!(registry.get("mining").await.is_none());
        assert!(!orchestrator.is_wiping());
    }

    #[tokio::test(start_paused = true)]
    async fn regenerating_world_keeps_its_schedule_and_records_the_wipe() {
        let host = FakeHost::new(&["default", "mining"]);
        let registry = registry_with(&["mining"], &["default"]);
        let settings = WipeSettings {
            regenerate_default: true,
            ..fast_settings()
        };
        let orchestrator = orchestrator_with(&host, Arc::clone(&registry), settings);

        let report = orchestrator.execute_one("mining").await;

        assert_eq!(report.outcome, WipeOutcome::Wiped { occupants_moved: 0 });
        let entry = registry.get("mining").await.expect("schedule kept");
        assert!(entry.last_wipe.is_some());

        // Let the detached regeneration task run.
        tokio::task::yield_now().await;
        assert_eq!(host.regenerated(), vec!["mining".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_regeneration_does_not_unmark_the_wipe() {
        let host = FakeHost::new(&["default", "mining"]);
        host.fail_regeneration();
        let registry = registry_with(&["mining"], &["default"]);
        let settings = WipeSettings {
            regenerate_default: true,
            ..fast_settings()
        };
        let orchestrator = orchestrator_with(&host, Arc::clone(&registry), settings);

        let report = orchestrator.execute_one("mining").await;
        assert_eq!(report.outcome, WipeOutcome::Wiped { occupants_moved: 0 });

        tokio::task::yield_now().await;
        assert!(host.regenerated().is_empty());
        // The wipe stays recorded even though regeneration failed.
        assert!(registry.last_wipe("mining").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn per_world_override_beats_the_global_default() {
        let host = FakeHost::new(&["default", "mining"]);
        let registry = Arc::new(ScheduleRegistry::load(
            vec![(
                "mining".to_string(),
                RawWorldEntry {
                    regenerate_on_wipe: Some(false),
                    ..RawWorldEntry::default()
                },
            )],
            vec!["default".to_string()],
        ));
        let settings = WipeSettings {
            regenerate_default: true,
            ..fast_settings()
        };
        let orchestrator = orchestrator_with(&host, Arc::clone(&registry), settings);

        let report = orchestrator.execute_one("mining").await;
        assert_eq!(report.outcome, WipeOutcome::Retired { occupants_moved: 0 });
        tokio::task::yield_now().await;
        assert!(host.regenerated().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn protected_world_is_rejected() {
        let host = FakeHost::new(&["default"]);
        let registry = registry_with(&[], &["default"]);
        let orchestrator = orchestrator(&host, registry);

        let report = orchestrator.execute_one("default").await;
        assert_eq!(report.outcome, WipeOutcome::Protected);
        assert!(!orchestrator.is_wiping());
    }

    #[tokio::test(start_paused = true)]
    async fn destination_fallbacks_and_self_wipe_rejection() {
        // No protected world loaded and no server default.
        let host = FakeHost::new(&[]);
        host.set_default_world(None);
        let registry = registry_with(&["mining"], &["default"]);
        {
            let orchestrator = orchestrator(&host, Arc::clone(&registry));
            let report = orchestrator.execute_one("mining").await;
            assert_eq!(report.outcome, WipeOutcome::DestinationUnresolved);
        }

        // Server default resolves, but equals the target.
        let host = FakeHost::new(&["hub"]);
        host.set_default_world(Some("Mining"));
        let orchestrator = orchestrator(&host, registry);
        let report = orchestrator.execute_one("mining").await;
        assert_eq!(report.outcome, WipeOutcome::TargetIsDestination);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_occupants_exhaust_the_retry_budget() {
        let host = FakeHost::new(&["default", "mining"]);
        host.set_occupants("mining", 2);
        host.set_stuck_occupants(true);
        let registry = registry_with(&["mining"], &["default"]);
        let settings = WipeSettings {
            cleanup_interval: Duration::from_millis(10),
            max_cleanup_attempts: 15,
            regenerate_default: false,
        };
        let orchestrator = orchestrator_with(&host, Arc::clone(&registry), settings);

        let started = tokio::time::Instant::now();
        let report = orchestrator.execute_one("mining").await;

        assert_eq!(report.outcome, WipeOutcome::CleanupTimeout);
        // Exactly max_cleanup_attempts checks spaced by the interval.
        assert_eq!(started.elapsed(), Duration::from_millis(150));
        assert!(!host.was_deleted("mining"));
        assert!(!orchestrator.is_wiping());
        // The schedule stays; the wipe simply failed.
        assert!(registry.get("mining").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_failures_share_the_attempt_budget() {
        let host = FakeHost::new(&["default", "mining"]);
        host.fail_deletes(2);
        let registry = registry_with(&["mining"], &["default"]);
        let orchestrator = orchestrator(&host, registry);

        let report = orchestrator.execute_one("mining").await;
        assert_eq!(report.outcome, WipeOutcome::Retired { occupants_moved: 0 });
        assert!(host.was_deleted("mining"));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_deletion_failure_aborts() {
        let host = FakeHost::new(&["default", "mining"]);
        host.fail_deletes(usize::MAX);
        let registry = registry_with(&["mining"], &["default"]);
        let orchestrator = orchestrator(&host, registry);

        let report = orchestrator.execute_one("mining").await;
        assert_eq!(report.outcome, WipeOutcome::DeleteFailed);
        assert!(!orchestrator.is_wiping());
    }

    #[tokio::test(start_paused = true)]
    async fn unloaded_world_skips_evacuation_and_is_deleted() {
        let host = FakeHost::new(&["default"]);
        host.set_loadable("mining");
        let registry = registry_with(&["mining"], &["default"]);
        let orchestrator = orchestrator(&host, registry);

        let report = orchestrator.execute_one("mining").await;
        assert_eq!(report.outcome, WipeOutcome::Retired { occupants_moved: 0 });
        assert!(host.was_deleted("mining"));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_reports_one_outcome_per_target() {
        let host = FakeHost::new(&["default", "mining", "arena"]);
        let registry = registry_with(&["mining", "arena"], &["default"]);
        let orchestrator = orchestrator(&host, registry);

        let targets = vec![
            "mining".to_string(),
            "default".to_string(),
            "arena".to_string(),
        ];
        let reports = orchestrator.execute(&targets).await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].outcome, WipeOutcome::Retired { occupants_moved: 0 });
        assert_eq!(reports[1].outcome, WipeOutcome::Protected);
        assert_eq!(reports[2].outcome, WipeOutcome::Retired { occupants_moved: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_wipes_lose_the_single_flight_race() {
        let host = FakeHost::new(&["default", "mining", "arena"]);
        host.set_occupants("mining", 1);
        host.set_stuck_occupants(true);
        let registry = registry_with(&["mining", "arena"], &["default"]);
        let orchestrator = Arc::new(orchestrator(&host, registry));

        let slow = {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.execute_one("mining").await })
        };
        tokio::task::yield_now().await;
        assert!(orchestrator.is_wiping());

        let rejected = orchestrator.execute_one("arena").await;
        assert_eq!(rejected.outcome, WipeOutcome::AlreadyInProgress);

        let slow_report = slow.await.unwrap();
        assert_eq!(slow_report.outcome, WipeOutcome::CleanupTimeout);

        // Flag released: the next wipe proceeds.
        let retry = orchestrator.execute_one("arena").await;
        assert_eq!(retry.outcome, WipeOutcome::Retired { occupants_moved: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn preview_is_side_effect_free() {
        let host = FakeHost::new(&["default", "mining"]);
        host.set_occupants("mining", 4);
        let registry = registry_with(&["mining"], &["default"]);
        let orchestrator = orchestrator(&host, registry);

        let preview = orchestrator.preview("mining").await.expect("destination");
        assert_eq!(preview.from, "mining");
        assert_eq!(preview.to, "default");
        assert_eq!(preview.occupants_moved, 0);
        assert_eq!(host.occupant_count("mining"), 4);
        assert!(!host.was_deleted("mining"));
    }
}
