//! Error taxonomy
//!
//! Three tiers with different blast radii:
//! - `ScanError`: a subtree could not be read — logged, traversal continues
//! - `HashError`: one file could not be hashed — becomes an `error` verdict
//! - `CheckpointError`: progress cannot be persisted — fatal to the run

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A directory entry or subtree could not be read during traversal.
/// Strictly local: the scanner logs it and keeps walking.
#[derive(Debug, Error)]
#[error("scan error: {0}")]
pub struct ScanError(#[from] pub walkdir::Error);

/// A candidate file could not be opened or fully read while hashing.
/// Recorded as an `error` verdict for that file; never aborts a batch.
#[derive(Debug, Error)]
#[error("cannot hash {}: {source}", .path.display())]
pub struct HashError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Checkpoint persistence failure. Losing resumability silently would defeat
/// the whole guarantee, so writes are fatal; a corrupt file on load is also
/// an error rather than a silent restart from scratch.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("cannot read checkpoint {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("checkpoint {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoint {} has unsupported version {found} (expected {expected})", .path.display())]
    Version {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    #[error("cannot encode checkpoint: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("cannot write checkpoint {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
