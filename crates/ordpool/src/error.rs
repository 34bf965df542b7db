//! Error types for the ordered worker pool.
//!
//! Two families of failure exist and they never mix:
//!
//! - [`SubmitError`]: a single submission was rejected. The payload is handed
//!   back and the pool keeps running.
//! - [`Error`]: pool-level failures. Ordering protocol violations and
//!   propagated panics are fatal to the [`OrderedResults`] that reports them.
//!
//! Per-job compute failures are neither: they travel in-order inside
//! [`JobResult::output`] as a [`JobError`].
//!
//! [`OrderedResults`]: crate::OrderedResults
//! [`JobResult::output`]: crate::JobResult
//! [`JobError`]: crate::JobError

use core::fmt;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Pool-level failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The dispatcher was already closed.
    #[error("dispatcher is closed")]
    ClosedDispatcher,

    /// The job queue is at capacity (non-blocking submission only).
    #[error("job queue is full")]
    QueueFull,

    /// A result arrived for a sequence that is already buffered.
    #[error("duplicate result for sequence {sequence}")]
    DuplicateSequence { sequence: u64 },

    /// A result arrived for a sequence that was already emitted.
    #[error("stale result for sequence {sequence} (next expected {next_expected})")]
    StaleSequence { sequence: u64, next_expected: u64 },

    /// A result arrived for a sequence that was never submitted.
    #[error("result for sequence {sequence} exceeds total of {total} jobs")]
    SequenceOutOfRange { sequence: u64, total: u64 },

    /// Every source closed before the result for `sequence` arrived.
    #[error("result for sequence {sequence} never arrived")]
    MissingSequence { sequence: u64 },

    /// A compute function panicked under `PanicPolicy::PropagateAndAbort`.
    #[error("worker panicked on sequence {sequence}: {message}")]
    WorkerPanicked { sequence: u64, message: String },

    /// The pool configuration was rejected.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}

impl Error {
    /// Returns `true` for errors that indicate the ordering invariant broke.
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateSequence { .. }
                | Self::StaleSequence { .. }
                | Self::SequenceOutOfRange { .. }
                | Self::MissingSequence { .. }
        )
    }
}

/// A rejected submission. The payload is always returned to the caller.
#[derive(Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError<T> {
    /// The dispatcher was closed, or the pool aborted.
    #[error("dispatcher is closed")]
    Closed(T),

    /// The job queue is at capacity.
    #[error("job queue is full")]
    Full(T),
}

impl<T> SubmitError<T> {
    /// Recovers the rejected payload.
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(payload) | Self::Full(payload) => payload,
        }
    }

    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

// Payloads need not be `Debug`.
impl<T> fmt::Debug for SubmitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("Closed(..)"),
            Self::Full(_) => f.write_str("Full(..)"),
        }
    }
}

impl<T> From<SubmitError<T>> for Error {
    fn from(err: SubmitError<T>) -> Self {
        match err {
            SubmitError::Closed(_) => Self::ClosedDispatcher,
            SubmitError::Full(_) => Self::QueueFull,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_error_returns_payload() {
        let err = SubmitError::Full(vec![1, 2, 3]);
        assert!(err.is_full());
        assert_eq!(err.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn submit_error_converts_to_pool_error() {
        assert_eq!(Error::from(SubmitError::Closed(7_u8)), Error::ClosedDispatcher);
        assert_eq!(Error::from(SubmitError::Full(7_u8)), Error::QueueFull);
    }

    #[test]
    fn protocol_violations_are_classified() {
        assert!(Error::DuplicateSequence { sequence: 3 }.is_protocol_violation());
        assert!(Error::MissingSequence { sequence: 0 }.is_protocol_violation());
        assert!(!Error::QueueFull.is_protocol_violation());
        assert!(
            !Error::WorkerPanicked {
                sequence: 1,
                message: "boom".into()
            }
            .is_protocol_violation()
        );
    }
}
