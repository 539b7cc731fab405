//! Offline actor tracking.
//!
//! Remembers when each actor was last seen and when each world was last
//! wiped, so a reconnecting actor can be redirected away from a world that
//! was reset while they were offline.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::persist::{SnapshotPaths, load_snapshot, save_snapshot};

/// Which disconnects are recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Record every disconnect.
    #[default]
    All,
    /// Record only disconnects from scheduled (reset) worlds.
    ResetWorldOnly,
}

/// Tracking store configuration.
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    /// Master switch; when off the store holds nothing and never redirects.
    pub enabled: bool,
    /// Persist snapshots to disk; when off the store prunes in memory but
    /// never touches storage.
    pub persist: bool,
    /// Entries older than this are pruned on every load/save cycle.
    /// Zero disables pruning.
    pub max_age_days: u32,
    pub mode: TrackingMode,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            persist: true,
            max_age_days: 90,
            mode: TrackingMode::All,
        }
    }
}

/// The offline tracking store.
pub struct OfflineTracker {
    config: TrackingConfig,
    paths: Option<SnapshotPaths>,
    last_seen: DashMap<Uuid, DateTime<Utc>>,
    last_wipe: DashMap<String, DateTime<Utc>>,
}

impl OfflineTracker {
    /// In-memory store; nothing is ever written to disk.
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            paths: None,
            last_seen: DashMap::new(),
            last_wipe: DashMap::new(),
        }
    }

    /// Store backed by snapshot files, loaded (and pruned) up front.
    /// Unreadable snapshots log a warning and start empty.
    pub fn with_snapshots(config: TrackingConfig, paths: SnapshotPaths) -> Self {
        let tracker = Self {
            paths: config.persist.then(|| paths.clone()),
            ..Self::new(config)
        };
        if !tracker.config.enabled || !tracker.config.persist {
            return tracker;
        }

        match load_snapshot(&paths.last_seen) {
            Ok(entries) => {
                for (key, instant) in entries {
                    match key.parse::<Uuid>() {
                        Ok(actor) => {
                            tracker.last_seen.insert(actor, instant);
                        }
                        Err(_) => {
                            warn!(key, "skipping last-seen entry with invalid actor id");
                        }
                    }
                }
            }
            Err(error) => warn!(error = %error, "failed to load actor last-seen snapshot"),
        }
        match load_snapshot(&paths.last_wipe) {
            Ok(entries) => {
                for (world, instant) in entries {
                    tracker.last_wipe.insert(world.to_lowercase(), instant);
                }
            }
            Err(error) => warn!(error = %error, "failed to load world last-wipe snapshot"),
        }

        tracker.prune();
        tracker
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn mode(&self) -> TrackingMode {
        self.config.mode
    }

    /// Record that an actor was seen (disconnected) now.
    pub fn record_seen(&self, actor: Uuid) {
        if !self.config.enabled {
            return;
        }
        self.last_seen.insert(actor, Utc::now());
        self.prune();
        self.save_last_seen();
    }

    pub fn last_seen(&self, actor: Uuid) -> Option<DateTime<Utc>> {
        self.last_seen.get(&actor).map(|entry| *entry.value())
    }

    /// Record a completed wipe for a world.
    pub fn record_wipe(&self, world: &str, at: DateTime<Utc>) {
        if !self.config.enabled {
            return;
        }
        self.last_wipe.insert(normalize(world), at);
        self.prune();
        self.save_last_wipe();
    }

    /// Merge externally persisted last-wipe records; the later instant wins.
    pub fn merge_last_wipes(&self, entries: impl IntoIterator<Item = (String, DateTime<Utc>)>) {
        if !self.config.enabled {
            return;
        }
        for (world, incoming) in entries {
            let key = normalize(&world);
            match self.last_wipe.get_mut(&key) {
                Some(mut existing) => {
                    if *existing.value() < incoming {
                        *existing.value_mut() = incoming;
                    }
                }
                None => {
                    self.last_wipe.insert(key, incoming);
                }
            }
        }
        self.prune();
        self.save_last_wipe();
    }

    /// Merged last-wipe instant for a world.
    pub fn last_wipe(&self, world: &str) -> Option<DateTime<Utc>> {
        self.last_wipe
            .get(&normalize(world))
            .map(|entry| *entry.value())
    }

    /// Whether a reconnecting actor was away for (or present before) the
    /// given wipe: last-seen is absent or not after the wipe instant.
    pub fn should_redirect(&self, actor: Uuid, wiped_at: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return false;
        }
        match self.last_seen(actor) {
            None => true,
            Some(seen) => seen <= wiped_at,
        }
    }

    /// Drop entries older than the configured retention.
    pub fn prune(&self) {
        if !self.config.enabled || self.config.max_age_days == 0 {
            return;
        }
        let cutoff = Utc::now() - Duration::days(i64::from(self.config.max_age_days));
        self.last_seen.retain(|_, instant| *instant >= cutoff);
        self.last_wipe.retain(|_, instant| *instant >= cutoff);
    }

    /// Clear everything (used when tracking is disabled at reload).
    pub fn clear(&self) {
        self.last_seen.clear();
        self.last_wipe.clear();
    }

    fn save_last_seen(&self) {
        let Some(paths) = &self.paths else { return };
        let entries = self
            .last_seen
            .iter()
            .map(|entry| (entry.key().to_string(), *entry.value()));
        if let Err(error) = save_snapshot(&paths.last_seen, entries) {
            warn!(error = %error, "failed to save actor last-seen snapshot");
        } else {
            debug!(count = self.last_seen.len(), "saved actor last-seen snapshot");
        }
    }

    fn save_last_wipe(&self) {
        let Some(paths) = &self.paths else { return };
        let entries = self
            .last_wipe
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()));
        if let Err(error) = save_snapshot(&paths.last_wipe, entries) {
            warn!(error = %error, "failed to save world last-wipe snapshot");
        }
    }
}

fn normalize(world: &str) -> String {
    world.trim().to_lowercase()
}
