//! JSON snapshot persistence for the tracking maps.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

/// Actor last-seen snapshot file name.
const LAST_SEEN_FILE: &str = "actor-last-seen.json";

/// World last-wipe snapshot file name.
const LAST_WIPE_FILE: &str = "world-last-wipe.json";

/// Errors from reading or writing tracking snapshots.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Locations of the two snapshot files.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub last_seen: PathBuf,
    pub last_wipe: PathBuf,
}

impl SnapshotPaths {
    /// Conventional file names inside a data directory.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            last_seen: dir.join(LAST_SEEN_FILE),
            last_wipe: dir.join(LAST_WIPE_FILE),
        }
    }
}

/// Read a string-keyed instant map. A missing file is an empty map;
/// entries with unparsable instants are skipped with a warning.
pub fn load_snapshot(path: &Path) -> Result<HashMap<String, DateTime<Utc>>, TrackingError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = fs::read_to_string(path)?;
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let entries: HashMap<String, String> = serde_json::from_str(&raw)?;
    let mut parsed = HashMap::with_capacity(entries.len());
    for (key, value) in entries {
        match DateTime::parse_from_rfc3339(&value) {
            Ok(instant) => {
                parsed.insert(key, instant.with_timezone(&Utc));
            }
            Err(_) => {
                warn!(path = %path.display(), key, "skipping snapshot entry with invalid instant");
            }
        }
    }
    Ok(parsed)
}

/// Write a string-keyed instant map, creating parent directories.
pub fn save_snapshot(
    path: &Path,
    entries: impl IntoIterator<Item = (String, DateTime<Utc>)>,
) -> Result<(), TrackingError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let serializable: HashMap<String, String> = entries
        .into_iter()
        .map(|(key, instant)| (key, instant.to_rfc3339()))
        .collect();
    fs::write(path, serde_json::to_string_pretty(&serializable)?)?;
    Ok(())
}
