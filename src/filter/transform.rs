//! Post-filter value rewriting.
//!
//! A [`ValueTransform`] lets the caller migrate surviving values to a
//! newer schema while compaction already has them in hand. The hook is
//! a separate pluggable step after the elimination rules: it never
//! influences which records survive, and a failure surfaces as the
//! filter's terminal status without revisiting already-decided
//! visibility.

use thiserror::Error;

/// Failure raised by a [`ValueTransform`] implementation.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransformError(pub String);

/// Rewrites a surviving record's value from one schema version to
/// another.
///
/// Invoked only for `Put`/`LargeValuePut` records whose value is kept
/// verbatim — deletion markers, corrupt pass-through records, and
/// values cleared by the single-delete deferred-output path are exempt.
pub trait ValueTransform: Send + Sync {
    /// Converts `value` from `current_version` to `target_version`.
    fn apply(
        &self,
        current_version: u32,
        target_version: u32,
        value: &[u8],
    ) -> Result<Vec<u8>, TransformError>;
}
