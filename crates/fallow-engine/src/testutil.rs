//! Shared test doubles for the engine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::hosts::{Evacuation, EvacuationReport, Regeneration, WorldProvider};
use crate::orchestrator::WipeSettings;

/// Settings small enough for paused-clock tests.
pub(crate) fn fast_settings() -> WipeSettings {
    WipeSettings {
        regenerate_default: false,
        cleanup_interval: Duration::from_millis(5),
        max_cleanup_attempts: 5,
    }
}

/// In-memory stand-in for the embedding game server.
#[derive(Default)]
pub(crate) struct FakeHost {
    loaded: Mutex<HashSet<String>>,
    loadable: Mutex<HashSet<String>>,
    occupants: Mutex<HashMap<String, usize>>,
    deleted: Mutex<Vec<String>>,
    regenerated: Mutex<Vec<String>>,
    default_world: Mutex<Option<String>>,
    stuck_occupants: AtomicBool,
    delete_failures: AtomicUsize,
    fail_regeneration: AtomicBool,
}

fn norm(world: &str) -> String {
    world.trim().to_lowercase()
}

impl FakeHost {
    pub fn new(loaded: &[&str]) -> Arc<Self> {
        let host = Self::default();
        *host.default_world.lock().unwrap() = Some("default".to_string());
        for world in loaded {
            host.loaded.lock().unwrap().insert(norm(world));
            host.loadable.lock().unwrap().insert(norm(world));
        }
        Arc::new(host)
    }

    pub fn set_occupants(&self, world: &str, count: usize) {
        self.occupants.lock().unwrap().insert(norm(world), count);
    }

    /// Relocation reports occupants moved but never drains the world.
    pub fn set_stuck_occupants(&self, stuck: bool) {
        self.stuck_occupants.store(stuck, Ordering::Relaxed);
    }

    pub fn set_loadable(&self, world: &str) {
        self.loadable.lock().unwrap().insert(norm(world));
    }

    pub fn set_default_world(&self, world: Option<&str>) {
        *self.default_world.lock().unwrap() = world.map(str::to_string);
    }

    /// Fail the next `count` deletions (`usize::MAX` fails forever).
    pub fn fail_deletes(&self, count: usize) {
        self.delete_failures.store(count, Ordering::Relaxed);
    }

    pub fn fail_regeneration(&self) {
        self.fail_regeneration.store(true, Ordering::Relaxed);
    }

    pub fn was_deleted(&self, world: &str) -> bool {
        self.deleted.lock().unwrap().contains(&norm(world))
    }

    pub fn regenerated(&self) -> Vec<String> {
        self.regenerated.lock().unwrap().clone()
    }
}

impl WorldProvider for FakeHost {
    fn is_loaded(&self, world: &str) -> bool {
        self.loaded.lock().unwrap().contains(&norm(world))
    }

    fn is_loadable(&self, world: &str) -> bool {
        self.loadable.lock().unwrap().contains(&norm(world))
    }

    fn occupant_count(&self, world: &str) -> usize {
        self.occupants
            .lock()
            .unwrap()
            .get(&norm(world))
            .copied()
            .unwrap_or(0)
    }

    fn default_world(&self) -> Option<String> {
        self.default_world.lock().unwrap().clone()
    }
}

#[async_trait]
impl Evacuation for FakeHost {
    async fn relocate(&self, from: &str, to: &str) -> EvacuationReport {
        let moved = if self.stuck_occupants.load(Ordering::Relaxed) {
            self.occupant_count(from)
        } else {
            self.occupants.lock().unwrap().remove(&norm(from)).unwrap_or(0)
        };
        EvacuationReport {
            from: from.to_string(),
            to: to.to_string(),
            occupants_moved: moved,
            message: EvacuationReport::relocation_message(from, to),
        }
    }

    fn dry_run(&self, from: &str, to: &str) -> EvacuationReport {
        EvacuationReport {
            from: from.to_string(),
            to: to.to_string(),
            occupants_moved: 0,
            message: "Dry run only (no occupants moved)".to_string(),
        }
    }

    async fn unload(&self, world: &str) -> bool {
        self.loaded.lock().unwrap().remove(&norm(world))
    }

    async fn delete_from_disk(&self, world: &str) -> bool {
        let remaining = self.delete_failures.load(Ordering::Relaxed);
        if remaining == usize::MAX {
            return false;
        }
        if remaining > 0 {
            self.delete_failures.store(remaining - 1, Ordering::Relaxed);
            return false;
        }
        self.loaded.lock().unwrap().remove(&norm(world));
        self.loadable.lock().unwrap().remove(&norm(world));
        self.deleted.lock().unwrap().push(norm(world));
        true
    }
}

#[async_trait]
impl Regeneration for FakeHost {
    async fn regenerate(&self, world: &str, _template: Option<&str>) -> Result<(), String> {
        if self.fail_regeneration.load(Ordering::Relaxed) {
            return Err("generator offline".to_string());
        }
        self.regenerated.lock().unwrap().push(norm(world));
        Ok(())
    }
}
