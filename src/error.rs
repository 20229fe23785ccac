//! Error taxonomy for index construction and collector dispatch.
//!
//! Construction either fully succeeds or fails with a [`BuildError`].
//! Dispatch always completes structurally; per-collector problems land in
//! the pass failure log as [`FailureKind`] entries, and only strict mode
//! escalates them into a [`DispatchError`].

use std::fmt;

/// Which measure tripped the resource guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SizeMeasure {
    /// Token count over the configured ceiling.
    Tokens,
    /// Raw byte size over the configured ceiling.
    Bytes,
}

impl fmt::Display for SizeMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeMeasure::Tokens => write!(f, "tokens"),
            SizeMeasure::Bytes => write!(f, "bytes"),
        }
    }
}

/// Fatal errors raised while building a structure index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// The document exceeded a size ceiling before any processing began.
    DocumentTooLarge {
        /// Measured value of the tripped measure.
        measured: usize,
        /// Configured ceiling.
        limit: usize,
        /// Which measure tripped.
        measure: SizeMeasure,
    },

    /// Structural nesting exceeded the configured depth ceiling mid-build.
    /// The partial index is discarded.
    NestingTooDeep {
        /// Depth reached when the ceiling was crossed.
        depth: usize,
        /// Configured ceiling.
        limit: usize,
        /// Token position where the ceiling was crossed.
        position: usize,
    },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::DocumentTooLarge {
                measured,
                limit,
                measure,
            } => write!(
                f,
                "document too large: {} {} over ceiling of {}",
                measured, measure, limit
            ),
            BuildError::NestingTooDeep {
                depth,
                limit,
                position,
            } => write!(
                f,
                "nesting too deep: depth {} over ceiling of {} at token {}",
                depth, limit, position
            ),
        }
    }
}

impl std::error::Error for BuildError {}

/// Classification of one recorded collector failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FailureKind {
    /// The callback missed its deadline.
    Timeout,
    /// The callback panicked.
    Panicked,
    /// The callback returned an error.
    Error,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Panicked => write!(f, "panicked"),
            FailureKind::Error => write!(f, "error"),
        }
    }
}

/// Errors raised by the dispatch engine itself (as opposed to failures of
/// individual collectors, which are logged and recovered).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Dispatch was invoked while a pass was already in progress. Routing
    /// and mask state are not reentrant-safe, so this signals a caller bug.
    Reentrant,

    /// Registering a collector would require more distinct ignore-inside
    /// types than the bit table can hold.
    TooManyWatchedTypes {
        /// Capacity of the type-to-bit table.
        limit: usize,
    },

    /// Strict-mode escalation of a single collector failure.
    CollectorFailed {
        /// Registered collector identity.
        name: String,
        /// Token position being visited when the failure occurred.
        position: usize,
        /// What went wrong.
        kind: FailureKind,
    },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Reentrant => {
                write!(f, "dispatch invoked while a pass is already in progress")
            }
            DispatchError::TooManyWatchedTypes { limit } => {
                write!(f, "more than {} distinct ignore-inside types", limit)
            }
            DispatchError::CollectorFailed {
                name,
                position,
                kind,
            } => write!(
                f,
                "collector '{}' failed ({}) at token {}",
                name, kind, position
            ),
        }
    }
}

impl std::error::Error for DispatchError {}
