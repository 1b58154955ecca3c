//! # SedimentDB
//!
//! The **compaction merge-filter** of a log-structured merge (LSM)
//! storage engine: the component that, during background compaction,
//! consumes one sorted stream of internal records and emits the reduced
//! stream in which obsolete, shadowed, or deletable versions have been
//! removed — while preserving exactly the versions still visible to any
//! open read snapshot.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use sedimentdb::{
//!     BytewiseComparator, CompactionFilter, ControlFlags, FilterOptions, KeyComparator,
//!     OpType, SnapshotSet, SourceRecord, VecSource,
//! };
//!
//! let cmp: Arc<dyn KeyComparator> = Arc::new(BytewiseComparator);
//!
//! // A sorted run with two versions of one key.
//! let source = VecSource::new(
//!     cmp.clone(),
//!     vec![
//!         SourceRecord::from_parts(b"k", 5, OpType::Put, b"new"),
//!         SourceRecord::from_parts(b"k", 3, OpType::Put, b"old"),
//!     ],
//! );
//!
//! let mut filter = CompactionFilter::new(
//!     source,
//!     cmp,
//!     SnapshotSet::empty(), // no open snapshots
//!     100,                  // newest assigned sequence
//!     ControlFlags::new(),
//!     FilterOptions::default(),
//! )
//! .unwrap();
//!
//! filter.seek_to_first();
//! assert!(filter.valid());
//! assert_eq!(filter.current_value(), b"new");
//!
//! filter.advance();
//! assert!(!filter.valid()); // the shadowed version was dropped
//! assert_eq!(filter.stats().hidden_drop, 1);
//! filter.status().unwrap();
//! ```
//!
//! ## Components
//!
//! - [`key`] — internal key codec: `(user_key, sequence, op)` with a
//!   pluggable user-key comparator.
//! - [`snapshot`] — the immutable snapshot set a compaction runs
//!   against, and its visibility-class arithmetic.
//! - [`source`] — the [`InternalSource`] input contract plus in-memory
//!   and k-way-merge implementations.
//! - [`filter`] — the merge-filter itself: visibility state machine,
//!   deletion-marker elimination, statistics, cooperative
//!   shutdown/cancellation, and the post-filter value-transform hook.
//!
//! ## Guarantees
//!
//! - **Visibility completeness:** after filtering, each snapshot sees
//!   at most one version per user key.
//! - **No resurrection:** the filter only removes records; it never
//!   fabricates or reorders versions within a key.
//! - **Cooperative abort:** shutdown and per-task cancellation are
//!   honored at input-pull granularity and surface through
//!   [`CompactionFilter::status`].

pub mod filter;
pub mod key;
pub mod snapshot;
pub mod source;

pub use filter::{
    CompactionFilter, ControlFlags, FilterError, FilterOptions, FilterStats, TaskType,
    TransformError, ValueTransform,
};
pub use key::{
    BytewiseComparator, KeyComparator, MAX_SEQUENCE, OpType, ParsedKey, encode_internal_key,
    parse_internal_key,
};
pub use snapshot::SnapshotSet;
pub use source::{InternalSource, MergeSource, SourceError, SourceRecord, VecSource};
