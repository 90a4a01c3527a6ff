//! Run orchestration
//!
//! Wires the scanner through the batcher into the worker pool, folds
//! completions back in sequence order, and checkpoints after every
//! contiguous batch. The checkpoint is the only state shared across
//! invocations and is mutated from exactly one place: the fold below.

use crate::batch::Batcher;
use crate::checkpoint::{CheckpointState, CheckpointStore, CHECKPOINT_VERSION};
use crate::output::OutputMode;
use crate::pool::{self, PoolConfig};
use crate::record::{Totals, Window};
use crate::report::{Reporter, RunSummary};
use crate::scanner::Scanner;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, DurationRound, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Inputs for one verification run.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Filestore root directory
    pub root: PathBuf,
    /// Operator-supplied window; overrides the checkpoint-derived one
    pub window_override: Option<Window>,
    pub batch_size: usize,
    pub workers: usize,
    pub checkpoint_path: PathBuf,
    /// Where to write the plain-text report, if anywhere
    pub report_path: Option<PathBuf>,
    pub mode: OutputMode,
}

/// Truncate to whole microseconds so a timestamp survives the checkpoint's
/// serialization unchanged; otherwise a resumed window could start a few
/// nanoseconds before the stored end.
fn now_truncated() -> Result<DateTime<Utc>> {
    Utc::now()
        .duration_trunc(Duration::microseconds(1))
        .context("Failed to derive run timestamp")
}

/// Scan and verify one window of the filestore.
///
/// Setting `cancel` (from a signal handler or another thread) stops
/// discovery; in-flight batches finish and are checkpointed, everything else
/// is left for the next run. Returns an error only for environment failures:
/// a missing root or an unusable checkpoint location. Corruption findings are
/// reported in the summary, not as errors.
pub fn run(options: &VerifyOptions, cancel: &AtomicBool) -> Result<RunSummary> {
    if !options.root.is_dir() {
        bail!(
            "root path {} does not exist or is not a directory",
            options.root.display()
        );
    }

    let store = CheckpointStore::new(options.checkpoint_path.clone());
    let prior = store
        .load()
        .with_context(|| format!("Cannot load checkpoint {}", store.path().display()))?;
    let now = now_truncated()?;

    // Window and batch numbering for this run. A window interrupted mid-way
    // is re-scanned with its original bounds and already-completed batches
    // are skipped by sequence number; a completed window is followed by a
    // fresh contiguous one.
    let (window, base_sequence, skip_through, lifetime_totals) = match (
        options.window_override,
        &prior,
    ) {
        (Some(window), prior) => {
            let last = prior.as_ref().map_or(0, |p| p.last_completed_sequence);
            let totals = prior.as_ref().map_or(Totals::default(), |p| p.totals);
            (window, last, last, totals)
        }
        (None, Some(p)) if !p.window_complete => {
            (p.window, p.window_base_sequence, p.last_completed_sequence, p.totals)
        }
        (None, Some(p)) => (
            Window::new(p.window.end, now),
            p.last_completed_sequence,
            p.last_completed_sequence,
            p.totals,
        ),
        (None, None) => (Window::full_range(now), 0, 0, Totals::default()),
    };

    let mut state = CheckpointState {
        version: CHECKPOINT_VERSION,
        window,
        window_complete: false,
        window_base_sequence: base_sequence,
        last_completed_sequence: skip_through,
        totals: lifetime_totals,
        updated_at: now,
    };
    // Record the chosen window up front; this also fails fast when the
    // checkpoint location is unwritable, before any hashing starts.
    store
        .save(&state)
        .with_context(|| format!("Cannot persist checkpoint {}", store.path().display()))?;

    let scanner = Scanner::new(&options.root, window);
    let batcher = Batcher::new(scanner, options.batch_size, base_sequence, skip_through);
    let mut reporter = Reporter::new(options.mode);

    pool::run_pool(
        batcher,
        skip_through + 1,
        PoolConfig::with_workers(options.workers),
        cancel,
        |outcome| {
            state.last_completed_sequence = outcome.sequence_number;
            state.totals.merge(&outcome.totals);
            state.updated_at = Utc::now();
            store.save(&state).with_context(|| {
                format!(
                    "Checkpoint write failed at batch {}, stopping",
                    outcome.sequence_number
                )
            })?;
            reporter.record_batch(outcome);
            Ok(())
        },
    )?;

    let interrupted = cancel.load(Ordering::SeqCst);
    if !interrupted {
        state.window_complete = true;
        state.updated_at = Utc::now();
        store
            .save(&state)
            .with_context(|| format!("Cannot persist checkpoint {}", store.path().display()))?;
    }

    let summary = reporter.finish(options.root.clone(), window, interrupted);

    if let Some(report_path) = &options.report_path {
        if let Some(parent) = report_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Cannot create report directory {}", parent.display())
                })?;
            }
        }
        fs::write(report_path, summary.render_plain())
            .with_context(|| format!("Cannot write report {}", report_path.display()))?;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash;
    use crate::record::Verdict;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_valid(root: &Path, content: &[u8]) -> PathBuf {
        let digest = hash::sha1_bytes(content);
        let dir = root.join(&digest[..2]);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(&digest);
        fs::write(&path, content).unwrap();
        path
    }

    fn write_mismatched(root: &Path, name_hash: &str, content: &[u8]) -> PathBuf {
        let path = root.join(name_hash);
        fs::write(&path, content).unwrap();
        path
    }

    fn options(root: &Path, checkpoint_dir: &Path) -> VerifyOptions {
        VerifyOptions {
            root: root.to_path_buf(),
            window_override: None,
            batch_size: 2,
            workers: 2,
            checkpoint_path: checkpoint_dir.join("checkpoint.json"),
            report_path: None,
            mode: OutputMode::Quiet,
        }
    }

    fn fresh_cancel() -> AtomicBool {
        AtomicBool::new(false)
    }

    #[test]
    fn clean_tree_reports_no_findings() {
        let store_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        for content in [b"one".as_slice(), b"two", b"three"] {
            write_valid(store_dir.path(), content);
        }

        let summary = run(&options(store_dir.path(), state_dir.path()), &fresh_cancel()).unwrap();
        assert_eq!(summary.totals.pass, 3);
        assert_eq!(summary.totals.fail, 0);
        assert_eq!(summary.totals.error, 0);
        assert!(summary.totals.is_clean());
    }

    #[test]
    fn renamed_file_is_reported_as_exactly_one_fail() {
        let store_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        for content in [b"one".as_slice(), b"two", b"three"] {
            write_valid(store_dir.path(), content);
        }
        let wrong_name = "0123456789abcdef0123456789abcdef01234567";
        let bad_path = write_mismatched(store_dir.path(), wrong_name, b"renamed content");

        let summary = run(&options(store_dir.path(), state_dir.path()), &fresh_cancel()).unwrap();
        assert_eq!(summary.totals.pass, 3);
        assert_eq!(summary.totals.fail, 1);
        assert_eq!(summary.totals.error, 0);

        let failures: Vec<_> = summary.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].record.path, bad_path);
        assert_eq!(failures[0].record.expected_hash, wrong_name);
        match &failures[0].verdict {
            Verdict::Fail { actual_hash } => {
                assert_eq!(actual_hash, &hash::sha1_bytes(b"renamed content"));
            }
            other => panic!("expected fail, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_is_an_error_not_a_fail() {
        use std::os::unix::fs::PermissionsExt;

        let store_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        write_valid(store_dir.path(), b"readable");
        let locked = write_mismatched(
            store_dir.path(),
            "ffffffffffffffffffffffffffffffffffffffff",
            b"locked",
        );
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores file permissions; nothing to assert in that case
        if fs::read(&locked).is_ok() {
            return;
        }

        let summary = run(&options(store_dir.path(), state_dir.path()), &fresh_cancel()).unwrap();
        assert_eq!(summary.totals.pass, 1);
        assert_eq!(summary.totals.fail, 0);
        assert_eq!(summary.totals.error, 1);
        let errors: Vec<_> = summary.errors().collect();
        assert_eq!(errors[0].record.path, locked);
    }

    #[test]
    fn missing_root_is_an_environment_failure() {
        let state_dir = TempDir::new().unwrap();
        let result = run(
            &options(Path::new("/no/such/filestore"), state_dir.path()),
            &fresh_cancel(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn unwritable_checkpoint_location_fails_fast() {
        let store_dir = TempDir::new().unwrap();
        write_valid(store_dir.path(), b"content");

        let mut opts = options(store_dir.path(), Path::new("/proc"));
        opts.checkpoint_path = PathBuf::from("/proc/checkstore-denied/checkpoint.json");
        assert!(run(&opts, &fresh_cancel()).is_err());
    }

    #[test]
    fn completed_run_checkpoints_contiguous_windows() {
        let store_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        for content in [b"a".as_slice(), b"b", b"c", b"d", b"e"] {
            write_valid(store_dir.path(), content);
        }

        let opts = options(store_dir.path(), state_dir.path());
        let first = run(&opts, &fresh_cancel()).unwrap();
        assert_eq!(first.totals.pass, 5);
        assert_eq!(first.batches_completed, 3); // 2 + 2 + 1

        let store = CheckpointStore::new(opts.checkpoint_path.clone());
        let after_first = store.load().unwrap().unwrap();
        assert!(after_first.window_complete);
        assert_eq!(after_first.last_completed_sequence, 3);
        assert_eq!(after_first.totals.pass, 5);

        // Nothing new since the first run: fresh window, zero candidates
        let second = run(&opts, &fresh_cancel()).unwrap();
        assert_eq!(second.files, 0);
        let after_second = store.load().unwrap().unwrap();
        assert_eq!(after_second.window.start, after_first.window.end);
        assert_eq!(after_second.last_completed_sequence, 3);
    }

    #[test]
    fn interrupted_window_resumes_without_rework_or_gaps() {
        let store_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        for content in [b"a".as_slice(), b"b", b"c", b"d", b"e"] {
            write_valid(store_dir.path(), content);
        }

        let opts = options(store_dir.path(), state_dir.path());

        // Simulate an interruption after batch 2 of 3: the stored window is
        // incomplete and the checkpoint points at sequence 2.
        let cancel = fresh_cancel();
        cancel.store(true, Ordering::SeqCst);
        let aborted = run(&opts, &cancel).unwrap();
        assert!(aborted.interrupted);
        assert_eq!(aborted.files, 0);

        let store = CheckpointStore::new(opts.checkpoint_path.clone());
        let mut state = store.load().unwrap().unwrap();
        assert!(!state.window_complete);
        state.last_completed_sequence = 2;
        state.totals = Totals {
            pass: 4,
            fail: 0,
            error: 0,
        };
        store.save(&state).unwrap();

        // Resume: same window, batches 1-2 skipped, exactly one more file
        let resumed = run(&opts, &fresh_cancel()).unwrap();
        assert!(!resumed.interrupted);
        assert_eq!(resumed.files, 1);
        assert_eq!(resumed.totals.pass, 1);
        assert_eq!(resumed.window, state.window);

        let finished = store.load().unwrap().unwrap();
        assert!(finished.window_complete);
        assert_eq!(finished.last_completed_sequence, 3);
        assert_eq!(finished.totals.pass, 5); // union covers all five, no overlap
    }

    #[test]
    fn explicit_window_is_idempotent() {
        let store_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        for content in [b"x".as_slice(), b"y"] {
            write_valid(store_dir.path(), content);
        }

        let mut opts = options(store_dir.path(), state_dir.path());
        opts.window_override = Some(Window::full_range(Utc::now() + Duration::hours(1)));

        let first = run(&opts, &fresh_cancel()).unwrap();
        let second = run(&opts, &fresh_cancel()).unwrap();
        assert_eq!(first.totals, second.totals);
        assert_eq!(first.files, second.files);
        assert_eq!(first.totals.pass, 2);
    }

    #[test]
    fn report_file_is_written_when_requested() {
        let store_dir = TempDir::new().unwrap();
        let state_dir = TempDir::new().unwrap();
        write_valid(store_dir.path(), b"reported");

        let mut opts = options(store_dir.path(), state_dir.path());
        let report_path = state_dir.path().join("reports").join("run.txt");
        opts.report_path = Some(report_path.clone());

        run(&opts, &fresh_cancel()).unwrap();
        let text = fs::read_to_string(&report_path).unwrap();
        assert!(text.contains("Pass:    1"));
    }
}
