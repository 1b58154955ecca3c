use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::filter::{CompactionFilter, ControlFlags, FilterOptions};
use crate::key::{BytewiseComparator, KeyComparator, OpType};
use crate::snapshot::SnapshotSet;
use crate::source::{InternalSource, SourceRecord, VecSource};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The comparator every filter test runs with.
pub fn cmp() -> Arc<dyn KeyComparator> {
    Arc::new(BytewiseComparator)
}

/// Shorthand record constructors.
pub fn put(user_key: &[u8], sequence: u64, value: &[u8]) -> SourceRecord {
    SourceRecord::from_parts(user_key, sequence, OpType::Put, value)
}

pub fn large_put(user_key: &[u8], sequence: u64, value: &[u8]) -> SourceRecord {
    SourceRecord::from_parts(user_key, sequence, OpType::LargeValuePut, value)
}

pub fn del(user_key: &[u8], sequence: u64) -> SourceRecord {
    SourceRecord::from_parts(user_key, sequence, OpType::Delete, b"")
}

pub fn single_del(user_key: &[u8], sequence: u64) -> SourceRecord {
    SourceRecord::from_parts(user_key, sequence, OpType::SingleDelete, b"")
}

pub fn merge(user_key: &[u8], sequence: u64, value: &[u8]) -> SourceRecord {
    SourceRecord::from_parts(user_key, sequence, OpType::Merge, value)
}

/// A source over `records`, sorted into internal-key order.
pub fn source(records: Vec<SourceRecord>) -> VecSource {
    VecSource::new(cmp(), records)
}

/// A filter with default options over an in-memory run.
pub fn filter(
    records: Vec<SourceRecord>,
    snapshots: SnapshotSet,
    last_sequence: u64,
) -> CompactionFilter<VecSource> {
    filter_with(records, snapshots, last_sequence, FilterOptions::default())
}

/// A filter with explicit options over an in-memory run.
pub fn filter_with(
    records: Vec<SourceRecord>,
    snapshots: SnapshotSet,
    last_sequence: u64,
    options: FilterOptions,
) -> CompactionFilter<VecSource> {
    init_tracing();
    CompactionFilter::new(
        source(records),
        cmp(),
        snapshots,
        last_sequence,
        ControlFlags::new(),
        options,
    )
    .expect("filter construction")
}

/// Drains every surviving well-formed record into
/// `(user_key, sequence, op, value)` tuples.
///
/// Panics on corrupt pass-through records — corruption tests iterate
/// by hand instead.
pub fn drain<S: InternalSource>(
    filter: &mut CompactionFilter<S>,
) -> Vec<(Vec<u8>, u64, OpType, Vec<u8>)> {
    let mut out = Vec::new();
    filter.seek_to_first();
    while filter.valid() {
        let ikey = filter.current_ikey().expect("well-formed survivor");
        out.push((
            ikey.user_key.to_vec(),
            ikey.sequence,
            ikey.op,
            filter.current_value().to_vec(),
        ));
        filter.advance();
    }
    out
}
