//! The wipe service facade.
//!
//! One explicitly constructed, dependency-injected object wiring the
//! registry, tracker, orchestrator, scheduler, and catch-up together, and
//! exposing the entrypoints the command/UI layers and the reconnect hook
//! consume.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use fallow_schedule::{Schedule, ScheduleRegistry, WorldEntry};
use fallow_tracking::{OfflineTracker, TrackingMode};

use crate::catchup::CatchUp;
use crate::hosts::{Evacuation, EvacuationReport, Regeneration, WorldProvider};
use crate::orchestrator::{WipeOrchestrator, WipeSettings};
use crate::outcome::WipeReport;
use crate::scheduler::{AutoScheduler, NextRun};

/// Service-level configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Whether the automatic scheduler is armed at startup.
    pub scheduling_enabled: bool,
    /// Delay between catch-up replay items.
    pub replay_delay: Duration,
    pub wipe: WipeSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            scheduling_enabled: false,
            replay_delay: Duration::from_secs(1),
            wipe: WipeSettings::default(),
        }
    }
}

/// The wipe service.
#[derive(Clone)]
pub struct WipeService {
    registry: Arc<ScheduleRegistry>,
    tracker: Arc<OfflineTracker>,
    orchestrator: Arc<WipeOrchestrator>,
    scheduler: Arc<AutoScheduler>,
    catch_up: CatchUp,
}

impl WipeService {
    pub fn new(
        config: ServiceConfig,
        registry: ScheduleRegistry,
        tracker: OfflineTracker,
        evacuation: Arc<dyn Evacuation>,
        regeneration: Arc<dyn Regeneration>,
        provider: Arc<dyn WorldProvider>,
    ) -> Self {
        let registry = Arc::new(registry);
        let tracker = Arc::new(tracker);
        let orchestrator = Arc::new(WipeOrchestrator::new(
            Arc::clone(&registry),
            Arc::clone(&tracker),
            evacuation,
            regeneration,
            Arc::clone(&provider),
            config.wipe,
        ));
        let scheduler = Arc::new(AutoScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&orchestrator),
            provider,
            config.scheduling_enabled,
        ));
        let catch_up = CatchUp::new(
            Arc::clone(&registry),
            Arc::clone(&orchestrator),
            Arc::clone(&scheduler),
            config.replay_delay,
        );

        Self {
            registry,
            tracker,
            orchestrator,
            scheduler,
            catch_up,
        }
    }

    /// Startup sequence, then the scheduler loop until shutdown: merge the
    /// persisted last-wipe records into the tracker, replay missed wipes
    /// serially, and only then arm the first automatic timer.
    pub async fn start(&self, shutdown_rx: watch::Receiver<bool>) {
        info!("wipe service starting");

        let recorded = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter_map(|entry| entry.last_wipe.map(|at| (entry.name, at)));
        self.tracker.merge_last_wipes(recorded);

        self.catch_up.run().await;
        self.scheduler.run(shutdown_rx).await;

        info!("wipe service stopped");
    }

    /// Wipe a batch of worlds under one single-flight acquisition.
    pub async fn execute(&self, worlds: &[String]) -> Vec<WipeReport> {
        let reports = self.orchestrator.execute(worlds).await;
        self.scheduler.rearm().await;
        reports
    }

    /// Wipe one world now (manual/command path).
    pub async fn execute_one(&self, world: &str) -> WipeReport {
        let report = self.orchestrator.execute_one(world).await;
        self.scheduler.rearm().await;
        report
    }

    /// Preview the evacuation a wipe would perform; `None` when no
    /// destination world can be resolved.
    pub async fn preview(&self, world: &str) -> Option<EvacuationReport> {
        self.orchestrator.preview(world).await
    }

    /// Whether a wipe currently holds the single-flight flag.
    pub fn is_wiping(&self) -> bool {
        self.orchestrator.is_wiping()
    }

    pub async fn rearm(&self) {
        self.scheduler.rearm().await;
    }

    pub async fn list_schedules(&self) -> Vec<WorldEntry> {
        self.registry.snapshot().await
    }

    pub async fn next_run(&self) -> Option<NextRun> {
        self.scheduler.next_run().await
    }

    /// Insert or replace a world's schedule. False when the world is
    /// protected and cannot be scheduled.
    pub async fn upsert_schedule(
        &self,
        world: &str,
        schedule: Schedule,
        regenerate: Option<bool>,
    ) -> bool {
        let changed = self.registry.upsert(world, schedule, regenerate).await;
        self.scheduler.rearm().await;
        changed
    }

    /// Remove a world's schedule. Idempotent; reports whether anything
    /// changed.
    pub async fn remove_schedule(&self, world: &str) -> bool {
        let removed = self.registry.remove(world).await;
        self.scheduler.rearm().await;
        removed
    }

    pub fn is_scheduling_enabled(&self) -> bool {
        self.scheduler.is_enabled()
    }

    pub async fn set_scheduling_enabled(&self, enabled: bool) {
        self.scheduler.set_enabled(enabled).await;
    }

    pub async fn is_protected(&self, world: &str) -> bool {
        self.registry.is_protected(world).await
    }

    /// Reconnect hook: whether the actor must be redirected away from
    /// `world` because it was wiped while they were away.
    pub async fn should_redirect_on_reconnect(&self, actor: Uuid, world: &str) -> bool {
        if !self.tracker.is_enabled() {
            return false;
        }
        if self.registry.is_protected(world).await {
            return false;
        }
        // Only worlds under a reset schedule redirect.
        if self.registry.get(world).await.is_none() {
            return false;
        }
        let Some(wiped_at) = self.tracker.last_wipe(world) else {
            return false;
        };
        self.tracker.should_redirect(actor, wiped_at)
    }

    /// Disconnect hook. `world` is where the actor was when they left; in
    /// reset-world-only mode disconnects elsewhere are not recorded.
    pub async fn record_disconnect(&self, actor: Uuid, world: Option<&str>) {
        if !self.tracker.is_enabled() {
            return;
        }
        if self.tracker.mode() == TrackingMode::ResetWorldOnly {
            let Some(world) = world else { return };
            if self.registry.get(world).await.is_none() {
                return;
            }
        }
        self.tracker.record_seen(actor);
    }
}
