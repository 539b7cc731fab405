//! Offline actor tracking for scheduled world resets.
//!
//! Tracks per-actor last-seen and per-world last-wipe instants so the
//! reconnect hook can decide whether an actor must be redirected away from
//! a world that was wiped while they were offline. Snapshots persist as
//! JSON files with retention pruning.

mod persist;
mod store;

pub use persist::{SnapshotPaths, TrackingError, load_snapshot, save_snapshot};
pub use store::{OfflineTracker, TrackingConfig, TrackingMode};
