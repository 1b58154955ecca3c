//! Shutdown and cancellation flags shared across compaction tasks.
//!
//! One [`ControlFlags`] value is owned by the engine and cloned into
//! every compaction task. The merge-filter polls it cooperatively at
//! input-pull granularity: shutdown/stop before each pull, cancellation
//! once per outer pull loop. Relaxed atomic loads are sufficient — the
//! flags are advisory and the filter tolerates observing them one
//! record late.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Task classes that can be cancelled independently.
///
/// Each class owns one bit of the shared cancellation mask.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Memtable flush to a new table.
    Flush = 0,

    /// Size-tiered merge of similarly sized tables.
    MinorCompaction = 1,

    /// Full merge of every table.
    MajorCompaction = 2,

    /// Per-table garbage collection of spent deletion markers.
    TombstoneCompaction = 3,
}

impl TaskType {
    fn bit(self) -> i64 {
        1i64 << (self as u8)
    }

    /// Human-readable task name for logs.
    pub fn name(self) -> &'static str {
        match self {
            TaskType::Flush => "flush",
            TaskType::MinorCompaction => "minor_compaction",
            TaskType::MajorCompaction => "major_compaction",
            TaskType::TombstoneCompaction => "tombstone_compaction",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Externally owned shutdown and cancellation state.
///
/// Cloning shares the underlying atomics, so a clone handed to a
/// compaction task observes flag changes made through any other clone.
#[derive(Debug, Clone, Default)]
pub struct ControlFlags {
    shutting_down: Arc<AtomicBool>,
    background_stopped: Arc<AtomicBool>,
    cancel_mask: Arc<AtomicI64>,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals engine-wide shutdown. In-flight compactions abort with
    /// `ShutdownInProgress` at their next input pull.
    pub fn request_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
    }

    /// Stops background work without a full shutdown. Same abort
    /// semantics as [`request_shutdown`](ControlFlags::request_shutdown).
    pub fn stop_background(&self) {
        self.background_stopped.store(true, Ordering::Relaxed);
    }

    /// Cancels every running and future task of the given class.
    pub fn cancel(&self, task: TaskType) {
        self.cancel_mask.fetch_or(task.bit(), Ordering::Relaxed);
    }

    /// Clears a previous cancellation of the given class.
    pub fn clear_cancel(&self, task: TaskType) {
        self.cancel_mask.fetch_and(!task.bit(), Ordering::Relaxed);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }

    pub fn is_background_stopped(&self) -> bool {
        self.background_stopped.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self, task: TaskType) -> bool {
        self.cancel_mask.load(Ordering::Relaxed) & task.bit() != 0
    }
}
