//! Grouping the candidate stream into checkpointable batches

use crate::record::{Batch, FileRecord};

/// Default number of files per batch
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Iterator adapter that groups a record stream into fixed-size batches.
///
/// Sequence numbers continue from the checkpoint (`base_sequence + 1`), so a
/// resumed run's first new batch extends the prior numbering. When resuming an
/// interrupted window the tree is re-scanned in the same deterministic order,
/// and batches numbered at or below `skip_through` are discarded here instead
/// of being re-verified.
///
/// The final batch may be smaller than `batch_size`; empty batches are never
/// emitted.
pub struct Batcher<I> {
    records: I,
    batch_size: usize,
    next_sequence: u64,
    skip_through: u64,
}

impl<I> Batcher<I>
where
    I: Iterator<Item = FileRecord>,
{
    pub fn new(records: I, batch_size: usize, base_sequence: u64, skip_through: u64) -> Self {
        debug_assert!(skip_through >= base_sequence);
        Self {
            records,
            batch_size: batch_size.max(1),
            next_sequence: base_sequence + 1,
            skip_through,
        }
    }
}

impl<I> Iterator for Batcher<I>
where
    I: Iterator<Item = FileRecord>,
{
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        loop {
            let mut records = Vec::with_capacity(self.batch_size);
            while records.len() < self.batch_size {
                match self.records.next() {
                    Some(record) => records.push(record),
                    None => break,
                }
            }
            if records.is_empty() {
                return None;
            }

            let sequence = self.next_sequence;
            self.next_sequence += 1;
            if sequence <= self.skip_through {
                // Already verified before the interruption
                continue;
            }
            return Some(Batch::new(sequence, records));
        }
    }
}
