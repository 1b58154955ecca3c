//! Running counters maintained by the merge-filter.

/// Per-compaction statistics, exposed for observability and tuning.
/// Not part of the correctness contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Records pulled from the input source, including corrupt ones.
    pub input_records: u64,

    /// Input records carrying a `Delete` or `SingleDelete` marker.
    pub input_deletion_records: u64,

    /// Input records whose key failed to parse.
    pub input_corrupt_records: u64,

    /// Records dropped because a newer version in the same visibility
    /// class shadows them.
    pub hidden_drop: u64,

    /// Deletion markers dropped because nothing they could suppress can
    /// exist (spent `SingleDelete`s, deletes below every snapshot with
    /// nothing above them).
    pub obsolete_drop: u64,

    /// `SingleDelete` anomalies: the marker paired with something other
    /// than a `Put`, or with another `SingleDelete`.
    pub single_delete_mismatch: u64,

    /// `SingleDelete`s that reached the end of their key's chain without
    /// a match and were proven droppable by the upper-bound hint.
    pub single_delete_fallthrough: u64,

    /// `Merge` operands skipped — this engine variant does not support
    /// them.
    pub merge_skipped: u64,

    /// Large-object values dropped or cleared; their backing blobs can
    /// be reclaimed by the caller.
    pub large_values_dropped: u64,

    /// Total encoded key bytes pulled from the input.
    pub raw_key_bytes: u64,

    /// Total value bytes pulled from the input.
    pub raw_value_bytes: u64,
}

impl FilterStats {
    /// Zeroes the per-round drop counters. Input-side totals keep
    /// accumulating.
    pub fn reset_drop_counts(&mut self) {
        self.hidden_drop = 0;
        self.obsolete_drop = 0;
    }
}
