//! Schedule model and occurrence calculator for scheduled world resets.
//!
//! This crate provides:
//! - A tagged schedule type (weekly/daily/monthly) with per-world time zones
//! - Pure previous/next occurrence calculation
//! - The authoritative registry of schedules and protected worlds

mod calc;
mod registry;
mod types;

pub use calc::{next_occurrence, previous_occurrence};
pub use registry::ScheduleRegistry;
pub use types::{
    Cadence, DEFAULT_PROTECTED_WORLD, RawSchedule, RawWorldEntry, Schedule, ScheduleZone,
    WorldEntry,
};
