//! Durable, atomic verification progress
//!
//! The checkpoint is a small versioned JSON record written after every
//! completed batch with a write-to-temp-then-rename, so a crash mid-write can
//! never corrupt the previously valid state. An interrupted run therefore
//! loses at most the batches that were still in flight.

use crate::errors::CheckpointError;
use crate::record::{Totals, Window};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current checkpoint schema version
pub const CHECKPOINT_VERSION: u32 = 1;

/// Default checkpoint location, relative to the working directory
pub const DEFAULT_CHECKPOINT_DIR: &str = ".checkstore";
const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Durable verification progress, shared across invocations.
///
/// Invariants:
/// - a new run's window starts where the previous completed window ended
///   (no gaps, no overlap), unless the operator supplies an explicit window
/// - `last_completed_sequence` only ever refers to a contiguous prefix of the
///   batches emitted for `window`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub version: u32,
    pub window: Window,
    /// True once every batch in `window` has been verified. A false value
    /// means the run was interrupted and the next run resumes this window.
    pub window_complete: bool,
    /// Value of `last_completed_sequence` when `window` was opened; batch
    /// numbering for the window starts one past this.
    pub window_base_sequence: u64,
    /// Highest batch sequence number fully verified
    pub last_completed_sequence: u64,
    /// Lifetime pass/fail/error counts across all runs of this checkpoint
    pub totals: Totals,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub updated_at: DateTime<Utc>,
}

impl CheckpointState {
    /// Zero-value state for a first run: full-range window, zero counts.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            window: Window::full_range(now),
            window_complete: false,
            window_base_sequence: 0,
            last_completed_sequence: 0,
            totals: Totals::default(),
            updated_at: now,
        }
    }
}

/// Loads and persists `CheckpointState` at a fixed path.
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CHECKPOINT_DIR).join(CHECKPOINT_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state, or `None` if no checkpoint exists yet.
    ///
    /// A checkpoint that exists but cannot be parsed is an error, not a
    /// silent restart: resetting to the full range would re-verify the whole
    /// store and hide the corruption. Use `remove` to start over explicitly.
    pub fn load(&self) -> Result<Option<CheckpointState>, CheckpointError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|source| CheckpointError::Read {
            path: self.path.clone(),
            source,
        })?;
        let state: CheckpointState =
            serde_json::from_str(&content).map_err(|source| CheckpointError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        if state.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::Version {
                path: self.path.clone(),
                found: state.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        Ok(Some(state))
    }

    /// Persist the state atomically: write to a temp file in the same
    /// directory, fsync, then rename over the old checkpoint.
    pub fn save(&self, state: &CheckpointState) -> Result<(), CheckpointError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|source| CheckpointError::Write {
            path: self.path.clone(),
            source,
        })?;

        let json = serde_json::to_string_pretty(state).map_err(CheckpointError::Encode)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| CheckpointError::Write {
            path: self.path.clone(),
            source,
        })?;
        tmp.write_all(json.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|source| CheckpointError::Write {
                path: self.path.clone(),
                source,
            })?;
        tmp.persist(&self.path)
            .map_err(|err| CheckpointError::Write {
                path: self.path.clone(),
                source: err.error,
            })?;
        Ok(())
    }

    /// Delete the checkpoint so the next run starts from the full range.
    pub fn remove(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Write {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Verdict;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::new(dir.path().join("state").join("checkpoint.json"))
    }

    #[test]
    fn missing_checkpoint_loads_as_none() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(store_in(&temp_dir).load().unwrap(), None);
    }

    #[test]
    fn save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        let mut state = CheckpointState::initial(Utc::now());
        state.last_completed_sequence = 7;
        state.totals.record(&Verdict::Pass);
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().expect("state should exist");
        assert_eq!(loaded, state);
    }

    #[test]
    fn save_overwrites_previous_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        let mut state = CheckpointState::initial(Utc::now());
        store.save(&state).unwrap();
        state.last_completed_sequence = 3;
        state.window_complete = true;
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.last_completed_sequence, 3);
        assert!(loaded.window_complete);
    }

    #[test]
    fn corrupt_checkpoint_is_an_error_not_a_reset() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), b"{ not json").unwrap();

        assert!(matches!(
            store.load(),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        let mut state = CheckpointState::initial(Utc::now());
        state.version = CHECKPOINT_VERSION + 1;
        store.save(&state).unwrap();

        assert!(matches!(
            store.load(),
            Err(CheckpointError::Version { found, .. }) if found == CHECKPOINT_VERSION + 1
        ));
    }

    #[test]
    fn remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir);

        store.save(&CheckpointState::initial(Utc::now())).unwrap();
        store.remove().unwrap();
        store.remove().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
