//! Collaborator interfaces the wipe engine drives.
//!
//! The engine never moves an occupant or generates world content itself;
//! the embedding server supplies these services.

use async_trait::async_trait;

/// Outcome of relocating occupants out of a resetting world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvacuationReport {
    pub from: String,
    pub to: String,
    pub occupants_moved: usize,
    /// Human-readable summary, shown to moved occupants.
    pub message: String,
}

impl EvacuationReport {
    /// Standard notice for occupants moved out of a resetting world.
    pub fn relocation_message(from: &str, to: &str) -> String {
        format!("You were moved from '{from}' to '{to}' because '{from}' is resetting.")
    }
}

/// Moves occupants and removes world data.
#[async_trait]
pub trait Evacuation: Send + Sync {
    /// Move every occupant of `from` into `to` and notify them.
    async fn relocate(&self, from: &str, to: &str) -> EvacuationReport;

    /// Preview a relocation without side effects.
    fn dry_run(&self, from: &str, to: &str) -> EvacuationReport;

    /// Unload the world from the server. False when nothing changed.
    async fn unload(&self, world: &str) -> bool;

    /// Delete the world's persisted data. Deleting an absent world succeeds.
    async fn delete_from_disk(&self, world: &str) -> bool;
}

/// Creates a fresh instance of a wiped world.
#[async_trait]
pub trait Regeneration: Send + Sync {
    /// Regenerate `world`, optionally from a named template. Failure is
    /// independent of wipe success.
    async fn regenerate(&self, world: &str, template: Option<&str>) -> Result<(), String>;
}

/// World existence and occupancy queries.
pub trait WorldProvider: Send + Sync {
    fn is_loaded(&self, world: &str) -> bool;

    fn is_loadable(&self, world: &str) -> bool;

    fn occupant_count(&self, world: &str) -> usize;

    /// Server fallback destination when no protected world is loaded.
    fn default_world(&self) -> Option<String>;
}
