//! Snapshot set — the visibility watermarks a compaction runs against.
//!
//! A [`SnapshotSet`] is a point-in-time copy of the sequence numbers of
//! all read snapshots open when a compaction task starts, plus the
//! earliest write-conflict watermark used by optimistic transactions.
//! Snapshots opened after the copy is taken do not affect an in-flight
//! compaction — each compaction commits atomically against the snapshot
//! view it started with.
//!
//! Consecutive watermarks partition the sequence space into
//! **visibility classes**: half-open intervals in which all versions of
//! a key are equivalent for retention purposes. Only the newest version
//! in each class must survive compaction.


use crate::key::MAX_SEQUENCE;

/// An immutable, ascending set of snapshot watermarks.
#[derive(Debug, Clone)]
pub struct SnapshotSet {
    /// Open-snapshot sequence numbers, strictly ascending.
    seqs: Vec<u64>,

    /// Earliest watermark relevant to write-conflict detection.
    /// `MAX_SEQUENCE` when no transaction needs conflict checking.
    earliest_write_conflict: u64,
}

impl SnapshotSet {
    /// Creates a snapshot set from an ascending list of watermarks.
    pub fn new(seqs: Vec<u64>, earliest_write_conflict: u64) -> Self {
        debug_assert!(seqs.windows(2).all(|w| w[0] < w[1]));
        Self {
            seqs,
            earliest_write_conflict,
        }
    }

    /// A set with no open snapshots and no transactions to protect —
    /// every record is judged against the tip of the log.
    pub fn empty() -> Self {
        Self::new(Vec::new(), MAX_SEQUENCE)
    }

    /// True when no snapshot constrains visibility.
    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// Number of open snapshots.
    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    /// Oldest open snapshot, if any.
    pub fn earliest(&self) -> Option<u64> {
        self.seqs.first().copied()
    }

    /// Newest open snapshot, if any.
    pub fn latest(&self) -> Option<u64> {
        self.seqs.last().copied()
    }

    /// The earliest write-conflict watermark.
    pub fn earliest_write_conflict(&self) -> u64 {
        self.earliest_write_conflict
    }

    /// Finds the visibility class of a sequence number.
    ///
    /// Returns `(visible, prev)` where `visible` is the smallest
    /// watermark `>= seq` (or [`MAX_SEQUENCE`] when the record is only
    /// visible at the tip) and `prev` is the watermark immediately
    /// below, with `0` meaning "no snapshot below".
    ///
    /// Two records of the same user key with equal `visible` values are
    /// in the same class — the older one is redundant.
    pub fn earliest_visible(&self, seq: u64) -> (u64, u64) {
        let idx = self.seqs.partition_point(|&s| s < seq);
        let visible = self.seqs.get(idx).copied().unwrap_or(MAX_SEQUENCE);
        let prev = if idx > 0 { self.seqs[idx - 1] } else { 0 };
        (visible, prev)
    }
}
