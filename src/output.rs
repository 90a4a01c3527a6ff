//! Output verbosity and machine-readable report printing

use crate::report::RunSummary;
use crate::record::Verdict;
use anyhow::{Context, Result};
use serde::Serialize;

/// Output verbosity mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Only errors
    Quiet,
    /// Progress spinner plus the final summary
    Normal,
    /// One persistent line per batch, findings as they are found
    Verbose,
}

impl OutputMode {
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            OutputMode::Quiet
        } else if verbose > 0 {
            OutputMode::Verbose
        } else {
            OutputMode::Normal
        }
    }
}

#[derive(Serialize)]
struct JsonReport {
    version: String,
    root: String,
    window_start: String,
    window_end: String,
    interrupted: bool,
    summary: JsonSummary,
    failures: Vec<JsonFailure>,
    errors: Vec<JsonError>,
}

#[derive(Serialize)]
struct JsonSummary {
    pass: u64,
    fail: u64,
    error: u64,
    files: u64,
    bytes_verified: u64,
    batches_completed: u64,
}

#[derive(Serialize)]
struct JsonFailure {
    path: String,
    expected_hash: String,
    actual_hash: String,
}

#[derive(Serialize)]
struct JsonError {
    path: String,
    reason: String,
}

/// Print the run summary as pretty JSON on stdout.
pub fn print_json(summary: &RunSummary) -> Result<()> {
    let failures = summary
        .failures()
        .filter_map(|a| match &a.verdict {
            Verdict::Fail { actual_hash } => Some(JsonFailure {
                path: a.record.path.display().to_string(),
                expected_hash: a.record.expected_hash.clone(),
                actual_hash: actual_hash.clone(),
            }),
            _ => None,
        })
        .collect();
    let errors = summary
        .errors()
        .filter_map(|a| match &a.verdict {
            Verdict::Error { reason } => Some(JsonError {
                path: a.record.path.display().to_string(),
                reason: reason.clone(),
            }),
            _ => None,
        })
        .collect();

    let report = JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        root: summary.root.display().to_string(),
        window_start: summary.window.start.to_rfc3339(),
        window_end: summary.window.end.to_rfc3339(),
        interrupted: summary.interrupted,
        summary: JsonSummary {
            pass: summary.totals.pass,
            fail: summary.totals.fail,
            error: summary.totals.error,
            files: summary.files,
            bytes_verified: summary.bytes_verified,
            batches_completed: summary.batches_completed,
        },
        failures,
        errors,
    };

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    println!("{json}");
    Ok(())
}
