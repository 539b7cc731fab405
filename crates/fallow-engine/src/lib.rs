//! Wipe engine for scheduled world resets.
//!
//! This crate provides:
//! - The single-flight wipe orchestrator (evacuate, bounded-retry cleanup,
//!   regenerate or retire)
//! - The automatic scheduler that keeps exactly one timer armed
//! - Missed-run catch-up performed at startup
//! - A dependency-injected [`WipeService`] facade tying it together

mod catchup;
mod hosts;
mod lock;
mod orchestrator;
mod outcome;
mod scheduler;
mod service;

#[cfg(test)]
mod testutil;

pub use catchup::CatchUp;
pub use hosts::{Evacuation, EvacuationReport, Regeneration, WorldProvider};
pub use lock::{WipeGuard, WipeLock};
pub use orchestrator::{WipeOrchestrator, WipeSettings};
pub use outcome::{WipeOutcome, WipeReport};
pub use scheduler::{AutoScheduler, NextRun};
pub use service::{ServiceConfig, WipeService};
