//! Authoritative in-memory schedule set.
//!
//! Owns the per-world schedules and the protected-world set. Readers get
//! cloned snapshots; mutation goes through `upsert`/`remove` so concurrent
//! callers never observe a half-applied change.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::types::{DEFAULT_PROTECTED_WORLD, RawWorldEntry, Schedule, WorldEntry, parse_instant};

struct Inner {
    /// Scheduled worlds in load/insertion order.
    worlds: Vec<WorldEntry>,
    /// Protected worlds, display casing preserved, deduplicated.
    protected: Vec<String>,
}

/// The schedule registry.
pub struct ScheduleRegistry {
    inner: RwLock<Inner>,
}

impl ScheduleRegistry {
    /// Empty registry with the default protected set.
    pub fn new() -> Self {
        Self::load(Vec::<(String, RawWorldEntry)>::new(), Vec::new())
    }

    /// Build a registry from persisted entries.
    ///
    /// Keys are trimmed and compared case-insensitively; the first
    /// occurrence of a duplicate wins, protected worlds are dropped from
    /// the schedule set, and each schedule's fields are resolved with the
    /// documented fallbacks.
    pub fn load(
        entries: impl IntoIterator<Item = (String, RawWorldEntry)>,
        protected: Vec<String>,
    ) -> Self {
        let protected = normalize_protected(protected);

        let mut worlds: Vec<WorldEntry> = Vec::new();
        for (name, raw) in entries {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            if is_in(&protected, name) {
                debug!(world = name, "skipping schedule for protected world");
                continue;
            }
            if worlds.iter().any(|w| w.name.eq_ignore_ascii_case(name)) {
                debug!(world = name, "skipping duplicate schedule entry");
                continue;
            }

            let schedule = raw.schedule.unwrap_or_default().resolve(name);
            let last_wipe = raw.last_wipe.as_deref().and_then(parse_instant);
            worlds.push(WorldEntry {
                name: name.to_string(),
                schedule,
                regenerate: raw.regenerate_on_wipe,
                last_wipe,
            });
        }

        if worlds.is_empty() {
            info!("no scheduled worlds configured");
        }

        Self {
            inner: RwLock::new(Inner { worlds, protected }),
        }
    }

    /// Insert or replace a world's schedule. Returns false when the world
    /// is protected and cannot be scheduled. A replaced entry keeps its
    /// recorded last wipe.
    pub async fn upsert(&self, name: &str, schedule: Schedule, regenerate: Option<bool>) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let mut inner = self.inner.write().await;
        if is_in(&inner.protected, name) {
            info!(world = name, "refusing to schedule protected world");
            return false;
        }
        if let Some(existing) = inner
            .worlds
            .iter_mut()
            .find(|w| w.name.eq_ignore_ascii_case(name))
        {
            existing.schedule = schedule;
            existing.regenerate = regenerate;
        } else {
            inner.worlds.push(WorldEntry {
                name: name.to_string(),
                schedule,
                regenerate,
                last_wipe: None,
            });
        }
        true
    }

    /// Remove a world's schedule. Idempotent; reports whether anything
    /// changed.
    pub async fn remove(&self, name: &str) -> bool {
        let mut inner = self.inner.write().await;
        let before = inner.worlds.len();
        inner.worlds.retain(|w| !w.name.eq_ignore_ascii_case(name.trim()));
        inner.worlds.len() != before
    }

    /// Cloned snapshot of every scheduled world.
    pub async fn snapshot(&self) -> Vec<WorldEntry> {
        self.inner.read().await.worlds.clone()
    }

    /// Look up one world's entry.
    pub async fn get(&self, name: &str) -> Option<WorldEntry> {
        self.inner
            .read()
            .await
            .worlds
            .iter()
            .find(|w| w.name.eq_ignore_ascii_case(name.trim()))
            .cloned()
    }

    pub async fn is_protected(&self, name: &str) -> bool {
        is_in(&self.inner.read().await.protected, name.trim())
    }

    pub async fn protected_worlds(&self) -> Vec<String> {
        self.inner.read().await.protected.clone()
    }

    /// The protected world used as relocation destination: the entry named
    /// `default` when present, else the first.
    pub async fn primary_protected(&self) -> String {
        let inner = self.inner.read().await;
        inner
            .protected
            .iter()
            .find(|w| w.eq_ignore_ascii_case(DEFAULT_PROTECTED_WORLD))
            .or_else(|| inner.protected.first())
            .cloned()
            .unwrap_or_else(|| DEFAULT_PROTECTED_WORLD.to_string())
    }

    /// Record a completed wipe on the world's entry.
    pub async fn set_last_wipe(&self, name: &str, at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner
            .worlds
            .iter_mut()
            .find(|w| w.name.eq_ignore_ascii_case(name.trim()))
        {
            entry.last_wipe = Some(at);
        }
    }

    pub async fn last_wipe(&self, name: &str) -> Option<DateTime<Utc>> {
        self.get(name).await.and_then(|entry| entry.last_wipe)
    }

    pub async fn regenerate_override(&self, name: &str) -> Option<bool> {
        self.get(name).await.and_then(|entry| entry.regenerate)
    }
}

impl Default for ScheduleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_in(protected: &[String], name: &str) -> bool {
    protected.iter().any(|w| w.eq_ignore_ascii_case(name))
}

/// Trim, drop blanks, deduplicate case-insensitively preserving first
/// casing; never empty.
fn normalize_protected(names: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() || is_in(&unique, trimmed) {
            continue;
        }
        unique.push(trimmed.to_string());
    }
    if unique.is_empty() {
        unique.push(DEFAULT_PROTECTED_WORLD.to_string());
    }
    unique
}
