//! Per-target wipe outcomes.
//!
//! Every failure mode the orchestrator can hit is converted into one of
//! these variants plus a log line; nothing propagates far enough to stop
//! the scheduler loop.

use std::fmt;

/// What happened to one wipe target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WipeOutcome {
    /// Deleted and queued for regeneration.
    Wiped { occupants_moved: usize },
    /// Deleted; the world does not regenerate, so its schedule was retired.
    Retired { occupants_moved: usize },
    /// Target is in the protected set.
    Protected,
    /// Another wipe held the single-flight flag.
    AlreadyInProgress,
    /// No destination world could be resolved for evacuation.
    DestinationUnresolved,
    /// Target and destination are the same world.
    TargetIsDestination,
    /// Occupants never left within the retry budget.
    CleanupTimeout,
    /// World data could not be deleted within the retry budget.
    DeleteFailed,
}

impl WipeOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Wiped { .. } | Self::Retired { .. })
    }
}

/// One target's outcome plus the name it was reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipeReport {
    pub world: String,
    pub outcome: WipeOutcome,
}

impl WipeReport {
    pub fn success(&self) -> bool {
        self.outcome.success()
    }

    /// Human-readable summary for the manual command path.
    pub fn message(&self) -> String {
        match &self.outcome {
            WipeOutcome::Wiped { occupants_moved } => format!(
                "Wiped '{}' ({} occupants moved); regenerating.",
                self.world, occupants_moved
            ),
            WipeOutcome::Retired { occupants_moved } => format!(
                "Wiped '{}' ({} occupants moved); world retired.",
                self.world, occupants_moved
            ),
            WipeOutcome::Protected => format!("World '{}' is protected.", self.world),
            WipeOutcome::AlreadyInProgress => "A wipe is already in progress.".to_string(),
            WipeOutcome::DestinationUnresolved => {
                "Destination world could not be resolved.".to_string()
            }
            WipeOutcome::TargetIsDestination => {
                format!("Cannot wipe the destination world '{}'.", self.world)
            }
            WipeOutcome::CleanupTimeout => format!(
                "Cleanup aborted: occupants still in world '{}'.",
                self.world
            ),
            WipeOutcome::DeleteFailed => {
                format!("Failed to delete world '{}' from disk.", self.world)
            }
        }
    }
}

impl fmt::Display for WipeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}
