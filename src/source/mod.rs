//! Sorted input sources — the record streams compaction consumes.
//!
//! This module defines:
//!
//! - [`InternalSource`] — the contract every record producer must meet:
//!   cursor-style positioning over records in non-decreasing
//!   internal-key order.
//! - [`VecSource`] — an in-memory sorted run. The reference source used
//!   by tests and benchmarks, and the building block for modelling
//!   memtable or table scans without touching disk.
//! - [`MergeSource`] — a heap-based k-way merge that combines several
//!   child sources into one globally ordered stream, the shape the
//!   compaction merge-filter is normally driven with.


use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use thiserror::Error;

use crate::key::{KeyComparator, OpType, compare_internal_keys, encode_internal_key};

/// Errors surfaced by an input source through [`InternalSource::status`].
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The underlying record stream is damaged beyond one record.
    #[error("corrupted record stream: {0}")]
    Corruption(String),

    /// Any other source-side failure.
    #[error("internal source error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// InternalSource — the input contract
// ------------------------------------------------------------------------------------------------

/// A cursor over records in non-decreasing internal-key order.
///
/// # Contract
///
/// - After construction the cursor is unpositioned; call
///   [`seek_to_first`](InternalSource::seek_to_first) (or
///   [`seek`](InternalSource::seek)) before reading.
/// - [`key`](InternalSource::key) and [`value`](InternalSource::value)
///   may only be called while [`valid`](InternalSource::valid) is true;
///   the returned views are invalidated by the next positioning call.
/// - [`advance`](InternalSource::advance) requires a valid position.
/// - Once [`status`](InternalSource::status) reports an error, `valid`
///   must return false.
pub trait InternalSource {
    /// Positions the cursor at the first record.
    fn seek_to_first(&mut self);

    /// Positions the cursor at the first record whose internal key is
    /// `>= target`. Optional skip-optimization hook; never required for
    /// correctness.
    fn seek(&mut self, target: &[u8]);

    /// True iff a record is available to read.
    fn valid(&self) -> bool;

    /// Encoded internal key of the current record.
    fn key(&self) -> &[u8];

    /// Value of the current record.
    fn value(&self) -> &[u8];

    /// Moves past the current record.
    fn advance(&mut self);

    /// Terminal error, if any.
    fn status(&self) -> Result<(), SourceError>;
}

// ------------------------------------------------------------------------------------------------
// SourceRecord — owned (key, value) pair
// ------------------------------------------------------------------------------------------------

/// An owned record held by a [`VecSource`].
#[derive(Debug, Clone)]
pub struct SourceRecord {
    /// Encoded internal key.
    pub key: Vec<u8>,

    /// Record value (empty for deletion markers).
    pub value: Vec<u8>,
}

impl SourceRecord {
    /// Builds a record from its logical parts.
    pub fn from_parts(user_key: &[u8], sequence: u64, op: OpType, value: &[u8]) -> Self {
        Self {
            key: encode_internal_key(user_key, sequence, op),
            value: value.to_vec(),
        }
    }

    /// Builds a record from raw key bytes, bypassing the codec.
    /// Lets tests inject corrupted keys into a stream.
    pub fn raw(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// VecSource — in-memory sorted run
// ------------------------------------------------------------------------------------------------

/// An in-memory sorted run of records.
///
/// Records are sorted on construction with the supplied comparator, so
/// callers may hand over records in any order.
pub struct VecSource {
    cmp: Arc<dyn KeyComparator>,
    records: Vec<SourceRecord>,
    pos: usize,
}

impl VecSource {
    /// Creates a source over `records`, sorting them into internal-key
    /// order.
    pub fn new(cmp: Arc<dyn KeyComparator>, mut records: Vec<SourceRecord>) -> Self {
        records.sort_by(|a, b| compare_internal_keys(cmp.as_ref(), &a.key, &b.key));
        let pos = records.len(); // unpositioned until the first seek
        Self { cmp, records, pos }
    }

    /// Number of records in the run.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the run holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl InternalSource for VecSource {
    fn seek_to_first(&mut self) {
        self.pos = 0;
    }

    fn seek(&mut self, target: &[u8]) {
        self.pos = self
            .records
            .partition_point(|r| compare_internal_keys(self.cmp.as_ref(), &r.key, target).is_lt());
    }

    fn valid(&self) -> bool {
        self.pos < self.records.len()
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.records[self.pos].key
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.records[self.pos].value
    }

    fn advance(&mut self) {
        debug_assert!(self.valid());
        self.pos += 1;
    }

    fn status(&self) -> Result<(), SourceError> {
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// MergeSource — heap-based k-way merge over child sources
// ------------------------------------------------------------------------------------------------

/// Heap entry tracking one child's current key.
///
/// Holds a copy of the key for ordering only; the exposed views always
/// come from the child source itself.
struct MergeHeapEntry {
    key: Vec<u8>,
    child: usize,
    cmp: Arc<dyn KeyComparator>,
}

impl Ord for MergeHeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse so the smallest internal key pops first.
        // Equal keys yield in child order, so callers listing newer
        // sources first get deterministic output.
        compare_internal_keys(self.cmp.as_ref(), &self.key, &other.key)
            .then_with(|| self.child.cmp(&other.child))
            .reverse()
    }
}

impl PartialOrd for MergeHeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(Ord::cmp(self, other))
    }
}

impl PartialEq for MergeHeapEntry {
    fn eq(&self, other: &Self) -> bool {
        Ord::cmp(self, other) == Ordering::Equal
    }
}

impl Eq for MergeHeapEntry {}

/// Merges several child sources into one globally ordered stream.
///
/// The merge itself never reorders records: it interleaves the children
/// by internal-key order, ties broken by child index. The first child
/// error observed becomes the merge's terminal status.
pub struct MergeSource<'a> {
    children: Vec<Box<dyn InternalSource + 'a>>,
    cmp: Arc<dyn KeyComparator>,
    heap: BinaryHeap<MergeHeapEntry>,
    status: Result<(), SourceError>,
}

impl<'a> MergeSource<'a> {
    pub fn new(cmp: Arc<dyn KeyComparator>, children: Vec<Box<dyn InternalSource + 'a>>) -> Self {
        Self {
            children,
            cmp,
            heap: BinaryHeap::new(),
            status: Ok(()),
        }
    }

    /// Pushes `child`'s current record onto the heap, recording its
    /// status if it failed instead.
    fn push_child(&mut self, child: usize) {
        if let Err(e) = self.children[child].status() {
            if self.status.is_ok() {
                self.status = Err(e);
            }
            return;
        }
        if self.children[child].valid() {
            self.heap.push(MergeHeapEntry {
                key: self.children[child].key().to_vec(),
                child,
                cmp: Arc::clone(&self.cmp),
            });
        }
    }

    fn reposition(&mut self, target: Option<&[u8]>) {
        self.status = Ok(());
        self.heap.clear();
        for idx in 0..self.children.len() {
            match target {
                Some(t) => self.children[idx].seek(t),
                None => self.children[idx].seek_to_first(),
            }
            self.push_child(idx);
        }
    }

    /// Child index currently at the front of the merge.
    fn front(&self) -> usize {
        debug_assert!(self.valid());
        self.heap.peek().map(|e| e.child).unwrap_or(0)
    }
}

impl InternalSource for MergeSource<'_> {
    fn seek_to_first(&mut self) {
        self.reposition(None);
    }

    fn seek(&mut self, target: &[u8]) {
        self.reposition(Some(target));
    }

    fn valid(&self) -> bool {
        self.status.is_ok() && !self.heap.is_empty()
    }

    fn key(&self) -> &[u8] {
        self.children[self.front()].key()
    }

    fn value(&self) -> &[u8] {
        self.children[self.front()].value()
    }

    fn advance(&mut self) {
        debug_assert!(self.valid());
        let Some(entry) = self.heap.pop() else {
            return;
        };
        self.children[entry.child].advance();
        self.push_child(entry.child);
    }

    fn status(&self) -> Result<(), SourceError> {
        self.status.clone()
    }
}
