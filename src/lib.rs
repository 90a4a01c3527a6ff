//! Checkstore library crate
//!
//! Resumable, concurrent integrity validation for a content-addressed
//! filestore: every file is named by the SHA-1 digest of its own content,
//! and this crate recomputes and compares those digests at scale.
//! Provides both the CLI binary and a library API for programmatic use.

pub mod batch;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod errors;
pub mod hash;
pub mod output;
pub mod pool;
pub mod progress;
pub mod record;
pub mod report;
pub mod scanner;
pub mod seed;
pub mod verifier;
