//! Core data model: candidate records, batches and verdicts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One candidate file discovered during traversal.
///
/// Immutable once produced by the scanner; consumed exactly once by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute path of the candidate file
    pub path: PathBuf,
    /// Lowercase 40-hex SHA-1 digest taken from the file name
    pub expected_hash: String,
    /// Modification time, used for windowing
    pub modified_at: DateTime<Utc>,
    /// File size in bytes (reporting only)
    pub size_bytes: u64,
}

/// Processing state of a batch.
///
/// Reflects whether verification of the batch finished, not whether its
/// content was valid. A batch full of mismatches still ends up `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    InProgress,
    Completed,
    /// Abandoned before every record received a verdict (interrupt).
    /// Never checkpointed, so the next run re-verifies it.
    Failed,
}

/// A fixed-size unit of verification work.
///
/// Sequence numbers are strictly increasing in discovery order and are the
/// basis for checkpointing. A batch is owned by exactly one worker at a time.
#[derive(Debug, Clone)]
pub struct Batch {
    pub sequence_number: u64,
    pub records: Vec<FileRecord>,
    pub status: BatchStatus,
}

impl Batch {
    pub fn new(sequence_number: u64, records: Vec<FileRecord>) -> Self {
        Self {
            sequence_number,
            records,
            status: BatchStatus::Pending,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-file classification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Recomputed digest equals the file name
    Pass,
    /// Digest computed successfully but differs from the name.
    /// This is a corruption finding, never an error.
    Fail { actual_hash: String },
    /// The file could not be read or hashed
    Error { reason: String },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// Verdict for one record. Only fail/error results are retained for the
/// final report; passes are folded into counters and dropped.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    pub record: FileRecord,
    pub verdict: Verdict,
}

/// Running pass/fail/error tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub pass: u64,
    pub fail: u64,
    pub error: u64,
}

impl Totals {
    pub fn record(&mut self, verdict: &Verdict) {
        match verdict {
            Verdict::Pass => self.pass += 1,
            Verdict::Fail { .. } => self.fail += 1,
            Verdict::Error { .. } => self.error += 1,
        }
    }

    pub fn merge(&mut self, other: &Totals) {
        self.pass += other.pass;
        self.fail += other.fail;
        self.error += other.error;
    }

    pub fn total(&self) -> u64 {
        self.pass + self.fail + self.error
    }

    pub fn is_clean(&self) -> bool {
        self.fail == 0 && self.error == 0
    }
}

/// The `[start, end)` modification-time range scanned in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub start: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Everything from the epoch up to `end` (first run, or `--full`).
    pub fn full_range(end: DateTime<Utc>) -> Self {
        Self {
            start: DateTime::UNIX_EPOCH,
            end,
        }
    }

    /// Inclusive at the start, exclusive at the end.
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} .. {}",
            self.start.format("%Y-%m-%d %H:%M:%S"),
            self.end.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn totals_record_and_merge() {
        let mut totals = Totals::default();
        totals.record(&Verdict::Pass);
        totals.record(&Verdict::Fail {
            actual_hash: "0".repeat(40),
        });
        totals.record(&Verdict::Error {
            reason: "boom".to_string(),
        });
        assert_eq!(totals.pass, 1);
        assert_eq!(totals.fail, 1);
        assert_eq!(totals.error, 1);
        assert_eq!(totals.total(), 3);
        assert!(!totals.is_clean());

        let mut other = Totals::default();
        other.record(&Verdict::Pass);
        other.merge(&totals);
        assert_eq!(other.pass, 2);
        assert_eq!(other.total(), 4);
    }

    #[test]
    fn window_is_inclusive_start_exclusive_end() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let window = Window::new(start, end);

        assert!(window.contains(start));
        assert!(!window.contains(end));
        assert!(window.contains(end - chrono::Duration::seconds(1)));
        assert!(!window.contains(start - chrono::Duration::seconds(1)));
    }

    #[test]
    fn window_survives_json_round_trip() {
        let window = Window::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 30, 5).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 12, 30, 5).unwrap(),
        );
        let json = serde_json::to_string(&window).unwrap();
        let back: Window = serde_json::from_str(&json).unwrap();
        assert_eq!(window, back);
    }
}
