//! # Compaction Merge-Filter
//!
//! The correctness-critical core of the engine: consumes one sorted
//! stream of internal records and produces the reduced stream in which
//! obsolete, shadowed, or deletable versions have been removed, while
//! preserving exactly the versions still visible to any open read
//! snapshot.
//!
//! ## Model
//!
//! The input delivers records ordered by `(user_key ASC, sequence DESC)`
//! — for each user key, newest version first. Consecutive snapshot
//! watermarks split the sequence space into **visibility classes**; a
//! version is redundant iff a newer version of the same key lives in the
//! same class. On top of that, deletion markers can themselves be
//! eliminated once nothing they suppress can exist:
//!
//! - A `SingleDelete` annihilates with the single `Put` it covers,
//!   unless an open transaction still needs to see that a write
//!   happened in its class (then the marker is kept and the `Put`
//!   survives with its value cleared).
//! - A plain `Delete` below every snapshot is dropped when the
//!   upper-bound hint proves the key cannot exist in any deeper level.
//!
//! ## Driving the filter
//!
//! Pull-style: the output sink calls [`CompactionFilter::seek_to_first`]
//! and [`CompactionFilter::advance`]; each call pulls as many input
//! records as needed to find the next survivor. Exposed key/value views
//! borrow from filter-owned buffers, never from the input source, and
//! stay valid until the next positioning call.
//!
//! ## Lifecycle
//!
//! Shutdown and stop flags are polled before every input pull, the
//! per-task cancellation mask once per pull loop. All terminal
//! conditions — corruption in strict mode, shutdown, cancellation,
//! transform failure — surface through [`CompactionFilter::status`];
//! once set, [`CompactionFilter::valid`] reports false and no further
//! records are produced. The filter never retries; rerunning a
//! compaction job is the scheduler's business.

pub mod control;
pub mod stats;
pub mod transform;

pub use control::{ControlFlags, TaskType};
pub use stats::FilterStats;
pub use transform::{TransformError, ValueTransform};

#[cfg(test)]
mod tests;

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::key::{
    FOOTER_LEN, KeyComparator, MAX_SEQUENCE, OpType, ParsedKey, pack_footer, parse_internal_key,
};
use crate::snapshot::SnapshotSet;
use crate::source::{InternalSource, SourceError};

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Terminal conditions reported by [`CompactionFilter::status`].
#[derive(Debug, Clone, Error)]
pub enum FilterError {
    /// A record key failed to parse and strict mode is on.
    #[error("corrupted internal key: {0}")]
    Corruption(String),

    /// Engine shutdown or background stop observed. Expected during
    /// normal operation — the caller discards partial output and may
    /// rerun the job later.
    #[error("shutdown in progress")]
    ShutdownInProgress,

    /// This task class was cancelled administratively. Same discard
    /// semantics as shutdown.
    #[error("task cancelled: {0}")]
    Cancelled(TaskType),

    /// The value-transform hook failed on a surviving record.
    #[error("value transform failed for key {key:?}: {source}")]
    Transform {
        /// User key of the offending record.
        key: Vec<u8>,
        source: TransformError,
    },

    /// The input source entered an error state.
    #[error("input source error: {0}")]
    Source(#[from] SourceError),

    /// Invalid construction-time options.
    #[error("invalid filter options: {0}")]
    InvalidOptions(String),
}

// ------------------------------------------------------------------------------------------------
// Options
// ------------------------------------------------------------------------------------------------

/// Construction-time tunables for a [`CompactionFilter`].
///
/// Engine-wide behavior switches are passed here explicitly — the
/// filter reads no ambient global state.
#[derive(Debug, Clone)]
pub struct FilterOptions {
    /// When true, a key that fails to parse terminates the compaction
    /// with [`FilterError::Corruption`]. When false (default), the
    /// corrupted record is passed through verbatim for the caller to
    /// deal with.
    pub strict_key_parsing: bool,

    /// When true, every well-formed record passes through unfiltered.
    /// Used while a newly split table's index is still being built and
    /// no version may be merged away yet.
    pub retain_all_records: bool,

    /// Task class this filter runs under, for the cancellation mask.
    pub task_type: TaskType,

    /// `(current, target)` schema versions for the value-transform
    /// hook. The hook only runs when `current < target`.
    pub schema_versions: Option<(u32, u32)>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            strict_key_parsing: false,
            retain_all_records: false,
            task_type: TaskType::MinorCompaction,
            schema_versions: None,
        }
    }
}

impl FilterOptions {
    /// Validates option consistency.
    fn validate(&self) -> Result<(), FilterError> {
        if let Some((current, target)) = self.schema_versions {
            if current > target {
                return Err(FilterError::InvalidOptions(format!(
                    "schema_versions must not downgrade: current {current} > target {target}"
                )));
            }
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// CompactionFilter
// ------------------------------------------------------------------------------------------------

/// Snapshot-aware merge-filter over one sorted input source.
///
/// Single-threaded and stateful: one compaction task owns exactly one
/// instance and drives it synchronously. Shared inputs ([`SnapshotSet`],
/// [`ControlFlags`]) are read-only for the filter's lifetime.
pub struct CompactionFilter<S: InternalSource> {
    input: S,
    cmp: Arc<dyn KeyComparator>,
    snapshots: SnapshotSet,
    options: FilterOptions,
    control: ControlFlags,
    upper_bound_hint: Option<Vec<u8>>,
    value_transform: Option<Box<dyn ValueTransform>>,

    // Derived once at construction.
    visible_at_tip: bool,
    earliest_snapshot: u64,

    // Filter-owned storage for the exposed record. The key is copied in
    // on the first occurrence of a user key; later versions of the same
    // key only rewrite the 8-byte footer in place.
    key_buf: Vec<u8>,
    value_buf: Vec<u8>,
    user_key_len: usize,
    record_sequence: u64,
    record_op: OpType,
    current_is_corrupt: bool,
    value_cleared: bool,

    // Cross-record state, reset whenever the user key changes.
    valid: bool,
    at_next: bool,
    has_current_user_key: bool,
    current_user_key_sequence: u64,
    current_user_key_snapshot: u64,
    has_outputted_key: bool,
    clear_and_output_next_key: bool,

    status: Result<(), FilterError>,
    stats: FilterStats,
}

impl<S: InternalSource> CompactionFilter<S> {
    /// Creates a filter over `input`.
    ///
    /// `last_sequence` is the newest sequence number assigned by the
    /// engine when the compaction started; with an empty snapshot set it
    /// bounds the single visibility class every record falls into.
    pub fn new(
        input: S,
        cmp: Arc<dyn KeyComparator>,
        snapshots: SnapshotSet,
        last_sequence: u64,
        control: ControlFlags,
        options: FilterOptions,
    ) -> Result<Self, FilterError> {
        options.validate()?;

        // Fast path when no snapshot constrains visibility: every
        // version of a key lands in one class bounded by the tip.
        let (visible_at_tip, earliest_snapshot) = match snapshots.earliest() {
            None => (true, last_sequence),
            Some(earliest) => (false, earliest),
        };

        debug!(
            snapshots = snapshots.len(),
            visible_at_tip,
            earliest_snapshot,
            task = %options.task_type,
            "compaction filter created"
        );

        Ok(Self {
            input,
            cmp,
            snapshots,
            options,
            control,
            upper_bound_hint: None,
            value_transform: None,
            visible_at_tip,
            earliest_snapshot,
            key_buf: Vec::new(),
            value_buf: Vec::new(),
            user_key_len: 0,
            record_sequence: 0,
            record_op: OpType::Put,
            current_is_corrupt: false,
            value_cleared: false,
            valid: false,
            at_next: false,
            has_current_user_key: false,
            current_user_key_sequence: 0,
            current_user_key_snapshot: 0,
            has_outputted_key: false,
            clear_and_output_next_key: false,
            status: Ok(()),
            stats: FilterStats::default(),
        })
    }

    /// Attaches the upper-bound hint: the largest user key that can
    /// exist in any level below this compaction's output. Enables the
    /// obsolete-deletion-marker eliminations; correctness never depends
    /// on it.
    pub fn with_upper_bound_hint(mut self, hint: impl Into<Vec<u8>>) -> Self {
        self.upper_bound_hint = Some(hint.into());
        self
    }

    /// Attaches the post-filter value-transform hook. Only invoked when
    /// [`FilterOptions::schema_versions`] requests an upgrade.
    pub fn with_value_transform(mut self, transform: Box<dyn ValueTransform>) -> Self {
        self.value_transform = Some(transform);
        self
    }

    // --------------------------------------------------------------------------------------------
    // Public iteration contract
    // --------------------------------------------------------------------------------------------

    /// Positions at the first surviving record. On an empty input or an
    /// error the filter simply becomes invalid; consult
    /// [`status`](CompactionFilter::status) to tell the two apart.
    pub fn seek_to_first(&mut self) {
        self.input.seek_to_first();
        if let Err(e) = self.input.status() {
            self.status = Err(e.into());
        }
        self.next_from_input();
        self.prepare_output();
    }

    /// Advances past the current output record to the next surviving
    /// one. Requires a valid position.
    pub fn advance(&mut self) {
        debug_assert!(self.valid());

        // The single-delete lookahead may have left the input already
        // positioned on the record after the current output.
        if !self.at_next {
            self.input.advance();
            if let Err(e) = self.input.status() {
                self.status = Err(e.into());
            }
        }
        self.next_from_input();

        if self.valid {
            // A record for the current user key has reached the output.
            self.has_outputted_key = true;
        }

        self.prepare_output();
    }

    /// True iff a record is available to read.
    pub fn valid(&self) -> bool {
        self.valid && self.status.is_ok()
    }

    /// Encoded internal key of the current record. For a corrupt
    /// pass-through record these are the raw input bytes, verbatim.
    pub fn current_key(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.key_buf
    }

    /// Value of the current record.
    pub fn current_value(&self) -> &[u8] {
        debug_assert!(self.valid());
        &self.value_buf
    }

    /// Decoded view of the current key, or `None` for a corrupt
    /// pass-through record.
    pub fn current_ikey(&self) -> Option<ParsedKey<'_>> {
        debug_assert!(self.valid());
        if self.current_is_corrupt {
            return None;
        }
        Some(ParsedKey {
            user_key: self.user_key(),
            sequence: self.record_sequence,
            op: self.record_op,
        })
    }

    /// Terminal status: `Ok` while iteration can continue or has merely
    /// exhausted the input.
    pub fn status(&self) -> Result<(), FilterError> {
        self.status.clone()
    }

    /// Running statistics.
    pub fn stats(&self) -> &FilterStats {
        &self.stats
    }

    /// Zeroes the per-round drop counters.
    pub fn reset_drop_counts(&mut self) {
        self.stats.reset_drop_counts();
    }

    // --------------------------------------------------------------------------------------------
    // Core pull loop
    // --------------------------------------------------------------------------------------------

    fn user_key(&self) -> &[u8] {
        &self.key_buf[..self.user_key_len]
    }

    /// Pulls input records until one survives the elimination rules,
    /// the input is exhausted, or a terminal condition is hit.
    fn next_from_input(&mut self) {
        self.at_next = false;
        self.valid = false;

        while !self.valid
            && self.status.is_ok()
            && self.input.valid()
            && !self.control.is_shutting_down()
            && !self.control.is_background_stopped()
        {
            self.stats.input_records += 1;

            let (sequence, op) = match parse_internal_key(self.input.key()) {
                Ok(parsed) => (parsed.sequence, parsed.op),
                Err(err) => {
                    if self.options.strict_key_parsing {
                        error!(%err, "corrupted internal key in strict mode");
                        self.status = Err(FilterError::Corruption(err.to_string()));
                    } else {
                        self.pass_through_corrupt();
                    }
                    break;
                }
            };

            if op.is_deletion() {
                self.stats.input_deletion_records += 1;
            }
            self.stats.raw_key_bytes += self.input.key().len() as u64;
            self.stats.raw_value_bytes += self.input.value().len() as u64;

            let key_changed = {
                let raw = self.input.key();
                let user = &raw[..raw.len() - FOOTER_LEN];
                !self.has_current_user_key || !self.cmp.equal(self.user_key(), user)
            };

            if key_changed {
                // First occurrence of this user key: copy the record
                // into filter-owned storage and reset per-key state.
                let raw = self.input.key();
                self.key_buf.clear();
                self.key_buf.extend_from_slice(raw);
                self.user_key_len = self.key_buf.len() - FOOTER_LEN;
                self.has_current_user_key = true;
                self.has_outputted_key = false;
                self.current_user_key_sequence = MAX_SEQUENCE;
                self.current_user_key_snapshot = 0;
            } else {
                // Same user key: rewrite the footer in place.
                let footer = pack_footer(sequence, op).to_le_bytes();
                let n = self.key_buf.len();
                self.key_buf[n - FOOTER_LEN..].copy_from_slice(&footer);
            }

            let value = self.input.value();
            self.value_buf.clear();
            self.value_buf.extend_from_slice(value);
            self.record_sequence = sequence;
            self.record_op = op;
            self.current_is_corrupt = false;
            self.value_cleared = false;

            if self.options.retain_all_records {
                self.valid = true;
                if let Err(e) = self.input.status() {
                    self.status = Err(e.into());
                }
                break;
            }

            // Locate this version's visibility class.
            let last_sequence = self.current_user_key_sequence;
            self.current_user_key_sequence = sequence;
            let last_snapshot = self.current_user_key_snapshot;
            let (current_snapshot, prev_snapshot) = if self.visible_at_tip {
                (self.earliest_snapshot, 0)
            } else {
                self.snapshots.earliest_visible(sequence)
            };
            self.current_user_key_snapshot = current_snapshot;

            if self.clear_and_output_next_key {
                // The previous iteration kept a SingleDelete it could
                // not compact out; this is the matched value. Keep the
                // record, drop the payload — it can never be read.
                debug_assert!(op.is_value());
                debug_assert_eq!(self.current_user_key_snapshot, last_snapshot);

                if op == OpType::LargeValuePut {
                    self.stats.large_values_dropped += 1;
                }
                self.value_buf.clear();
                self.value_cleared = true;
                self.valid = true;
                self.clear_and_output_next_key = false;
            } else if op == OpType::SingleDelete {
                self.process_single_delete(sequence, prev_snapshot);
                if self.valid {
                    self.at_next = true;
                }
            } else if last_snapshot == self.current_user_key_snapshot {
                // Same class as a newer version of this key: not
                // visible to any snapshot. Dropping it cannot hide a
                // write from conflict checking — a record for this key
                // and class has already gone out.
                debug_assert!(last_sequence >= sequence);
                self.stats.hidden_drop += 1;
                if op == OpType::LargeValuePut {
                    self.stats.large_values_dropped += 1;
                }
                self.input.advance();
            } else if self.is_obsolete_delete(op, sequence) {
                // Nothing above shadows this key, everything below is
                // newer-sequenced input to this same compaction, and no
                // snapshot can see it: the marker is unobservable.
                self.stats.obsolete_drop += 1;
                self.input.advance();
            } else if op == OpType::Merge {
                // Merge operands are not supported by this engine
                // variant; exclude them from the output.
                self.stats.merge_skipped += 1;
                self.input.advance();
            } else {
                // New user key, or first version in a new class.
                self.valid = true;
            }

            if let Err(e) = self.input.status() {
                self.status = Err(e.into());
            }
        }

        if !self.valid
            && (self.control.is_shutting_down() || self.control.is_background_stopped())
        {
            self.status = Err(FilterError::ShutdownInProgress);
            info!(task = %self.options.task_type, "compaction halted: shutdown in progress");
        }
        if self.status.is_ok() && self.control.is_cancelled(self.options.task_type) {
            self.status = Err(FilterError::Cancelled(self.options.task_type));
            self.valid = false;
            info!(task = %self.options.task_type, "compaction task cancelled");
        }
    }

    /// Copies a record whose key failed to parse into the output
    /// verbatim and poisons the cross-record state so nothing is
    /// compared against it.
    fn pass_through_corrupt(&mut self) {
        let raw = self.input.key();
        self.key_buf.clear();
        self.key_buf.extend_from_slice(raw);
        self.user_key_len = self.key_buf.len();
        let value = self.input.value();
        self.value_buf.clear();
        self.value_buf.extend_from_slice(value);

        self.current_is_corrupt = true;
        self.value_cleared = false;
        self.has_current_user_key = false;
        self.current_user_key_sequence = MAX_SEQUENCE;
        self.current_user_key_snapshot = 0;

        self.stats.input_corrupt_records += 1;
        self.valid = true;
        warn!(
            key_len = self.key_buf.len(),
            "passing corrupted internal key through"
        );
    }

    /// Handles a `SingleDelete` by peeking at the next input record.
    ///
    /// The marker can be compacted out when the matching value is found
    /// in the same visibility class AND either no open transaction
    /// needs write-conflict evidence for this class or a record for it
    /// has already been output. When the marker must stay but the value
    /// was found, the value follows with its payload cleared
    /// (`clear_and_output_next_key`).
    ///
    /// On return the input sits on the record after the marker; when a
    /// matched value was dropped too, one past it.
    fn process_single_delete(&mut self, sequence: u64, prev_snapshot: u64) {
        self.input.advance();

        let next = if self.input.valid() {
            match parse_internal_key(self.input.key()) {
                Ok(parsed) => {
                    let same_key = self.cmp.equal(self.user_key(), parsed.user_key);
                    Some((parsed.sequence, parsed.op, same_key))
                }
                Err(_) => None,
            }
        } else {
            None
        };

        match next {
            Some((next_sequence, next_op, true)) => {
                if prev_snapshot == 0 || next_sequence > prev_snapshot {
                    // Next record is in the marker's own class.
                    if next_op == OpType::SingleDelete {
                        // Two SingleDeletes in a row — unexpected user
                        // input. Skip the first (the peek already moved
                        // past it) and let the next iteration decide on
                        // the second.
                        self.stats.obsolete_drop += 1;
                        self.stats.single_delete_mismatch += 1;
                    } else if sequence <= self.snapshots.earliest_write_conflict()
                        || self.has_outputted_key
                    {
                        // The matched value and the marker annihilate.
                        // Safe: either a record for this class already
                        // went out, or no transaction is old enough to
                        // care about the write.
                        if next_op != OpType::Put {
                            self.stats.single_delete_mismatch += 1;
                        }
                        if next_op == OpType::LargeValuePut {
                            self.stats.large_values_dropped += 1;
                        }
                        self.stats.hidden_drop += 1;
                        self.stats.obsolete_drop += 1;
                        self.input.advance();
                    } else {
                        // Keep the marker so write-conflict checking
                        // still sees a write in this class; the matched
                        // value goes out next with its payload cleared.
                        self.valid = true;
                        self.clear_and_output_next_key = true;
                    }
                } else {
                    // A snapshot boundary lies between the marker and
                    // the next version: the marker is the newest record
                    // of its class and must survive.
                    self.valid = true;
                }
            }
            _ => {
                // End of input, a different user key, or an unparsable
                // next key. The input already sits on that record, so
                // the next iteration must not compare against our
                // state.
                self.has_current_user_key = false;

                let droppable = match &self.upper_bound_hint {
                    Some(hint) => {
                        sequence <= self.earliest_snapshot
                            && self.cmp.compare(self.user_key(), hint) == Ordering::Greater
                    }
                    None => false,
                };
                if droppable {
                    // The key cannot exist in any deeper level: the
                    // unmatched marker suppresses nothing.
                    self.stats.obsolete_drop += 1;
                    self.stats.single_delete_fallthrough += 1;
                } else {
                    self.valid = true;
                }
            }
        }
    }

    /// True when a plain `Delete` predates every snapshot and the
    /// upper-bound hint proves the key cannot exist in any deeper
    /// level.
    fn is_obsolete_delete(&self, op: OpType, sequence: u64) -> bool {
        let Some(hint) = &self.upper_bound_hint else {
            return false;
        };
        op == OpType::Delete
            && sequence <= self.earliest_snapshot
            && self.cmp.compare(self.user_key(), hint) == Ordering::Greater
    }

    // --------------------------------------------------------------------------------------------
    // Output post-processing
    // --------------------------------------------------------------------------------------------

    /// Runs the value-transform hook on a surviving record, if
    /// configured. Elimination decisions are never revisited here; a
    /// hook failure becomes the filter's terminal status.
    fn prepare_output(&mut self) {
        if !self.valid || self.status.is_err() {
            return;
        }
        let Some((current, target)) = self.options.schema_versions else {
            return;
        };
        if current >= target {
            return;
        }
        let Some(transform) = &self.value_transform else {
            return;
        };
        // Only values kept verbatim are rewritten: markers, corrupt
        // pass-through records, and cleared payloads are exempt.
        if self.current_is_corrupt
            || !self.record_op.is_value()
            || self.value_cleared
            || self.value_buf.is_empty()
        {
            return;
        }

        match transform.apply(current, target, &self.value_buf) {
            Ok(rewritten) => {
                self.value_buf = rewritten;
            }
            Err(err) => {
                error!(key = ?self.user_key(), %err, "value transform failed");
                self.status = Err(FilterError::Transform {
                    key: self.user_key().to_vec(),
                    source: err,
                });
                self.valid = false;
            }
        }
    }
}
