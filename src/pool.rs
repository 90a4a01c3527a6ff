//! Bounded concurrent verification
//!
//! One producer thread scans and batches; a fixed set of workers pulls
//! batches off a bounded channel (backpressure keeps memory flat when
//! hashing is slower than discovery) and hashes every record. Completions
//! arrive out of order and are re-sequenced on the calling thread, so batch
//! N is never handed to the checkpoint while N-1 is still outstanding.

use crate::hash;
use crate::record::{Batch, BatchStatus, FileRecord, Totals, VerificationResult, Verdict};
use anyhow::Result;
use crossbeam_channel::bounded;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Default worker thread count
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
    /// Capacity of the batch queue between producer and workers
    pub queue_depth: usize,
}

impl PoolConfig {
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            queue_depth: workers * 2,
        }
    }
}

/// Outcome of one fully verified batch.
///
/// Pass results are folded into `totals`; only fail/error verdicts are
/// carried individually.
#[derive(Debug)]
pub struct BatchOutcome {
    pub sequence_number: u64,
    pub status: BatchStatus,
    pub records: usize,
    pub bytes: u64,
    pub totals: Totals,
    pub anomalies: Vec<VerificationResult>,
}

/// Classify one record: recompute the digest and compare it to the name.
pub fn verify_record(record: &FileRecord) -> Verdict {
    match hash::sha1_file(&record.path) {
        Ok(actual) if actual == record.expected_hash => Verdict::Pass,
        Ok(actual) => Verdict::Fail { actual_hash: actual },
        // The report prefixes the path; keep only the underlying cause here
        Err(err) => Verdict::Error {
            reason: err.source.to_string(),
        },
    }
}

fn verify_batch(mut batch: Batch) -> BatchOutcome {
    batch.status = BatchStatus::InProgress;

    let mut totals = Totals::default();
    let mut anomalies = Vec::new();
    let mut bytes = 0u64;

    for record in &batch.records {
        let verdict = verify_record(record);
        totals.record(&verdict);
        if verdict.is_pass() {
            bytes += record.size_bytes;
        } else {
            anomalies.push(VerificationResult {
                record: record.clone(),
                verdict,
            });
        }
    }

    batch.status = BatchStatus::Completed;
    BatchOutcome {
        sequence_number: batch.sequence_number,
        status: batch.status,
        records: batch.records.len(),
        bytes,
        totals,
        anomalies,
    }
}

/// Drive a batch stream through the worker pool.
///
/// `on_complete` is invoked on the calling thread, in strict sequence order
/// starting at `first_sequence`, once for every batch whose records all have
/// verdicts. If it returns an error (a failed checkpoint write), the pool
/// shuts down and the error is propagated; already-verified but not yet
/// delivered batches are discarded, which is safe because they were never
/// checkpointed.
///
/// Setting `cancel` stops the producer; batches already claimed or queued
/// still finish and are delivered.
pub fn run_pool<I, F>(
    batches: I,
    first_sequence: u64,
    config: PoolConfig,
    cancel: &AtomicBool,
    mut on_complete: F,
) -> Result<()>
where
    I: Iterator<Item = Batch> + Send,
    F: FnMut(BatchOutcome) -> Result<()>,
{
    let (batch_tx, batch_rx) = bounded::<Batch>(config.queue_depth);
    let (outcome_tx, outcome_rx) = bounded::<BatchOutcome>(config.queue_depth);

    thread::scope(|scope| {
        scope.spawn(move || {
            for batch in batches {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                if batch_tx.send(batch).is_err() {
                    // All workers are gone; nothing left to feed
                    break;
                }
            }
        });

        for _ in 0..config.workers {
            let claim = batch_rx.clone();
            let done = outcome_tx.clone();
            scope.spawn(move || {
                while let Ok(batch) = claim.recv() {
                    let outcome = verify_batch(batch);
                    if done.send(outcome).is_err() {
                        break;
                    }
                }
            });
        }
        drop(batch_rx);
        drop(outcome_tx);

        let mut pending: BTreeMap<u64, BatchOutcome> = BTreeMap::new();
        let mut next = first_sequence;
        while let Ok(outcome) = outcome_rx.recv() {
            pending.insert(outcome.sequence_number, outcome);
            while let Some(ready) = pending.remove(&next) {
                if let Err(err) = on_complete(ready) {
                    cancel.store(true, Ordering::SeqCst);
                    drop(outcome_rx);
                    return Err(err);
                }
                next += 1;
            }
        }
        Ok(())
    })
}
