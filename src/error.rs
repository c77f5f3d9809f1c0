//! Error types shared across the crate.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The host lacks a required audio capability. Fatal at initialization.
    #[error("unsupported host configuration: {0}")]
    Unsupported(&'static str),

    /// An operation was issued before initialization completed.
    #[error("engine is not initialized")]
    NotInitialized,

    /// An operation referenced a nonexistent track or filter.
    #[error("no {kind} at index {index}")]
    BadIndex { kind: &'static str, index: usize },

    /// An enumerated field held an unknown value. Numeric out-of-range
    /// values are clamped, not rejected.
    #[error("bad parameter: {0}")]
    BadParameter(String),

    /// A render worker failed to come online within the init timeout.
    #[error("render worker failed to come online in time")]
    WorkerInitTimeout,

    /// A chunk failed on a worker and exhausted its retries.
    #[error("chunk {chunk} failed after {attempts} attempts: {reason}")]
    WorkerJobFailed {
        chunk: usize,
        attempts: u32,
        reason: String,
    },

    /// The offline render observed a cancellation request.
    #[error("render cancelled")]
    Cancelled,

    /// A precondition was violated. Should be unreachable.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn bad_filter_index(index: usize) -> Self {
        Self::BadIndex { kind: "filter", index }
    }

    pub fn bad_track_index(index: usize) -> Self {
        Self::BadIndex { kind: "track", index }
    }
}
