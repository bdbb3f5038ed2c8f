//! Append sink contract for the raw record store.
//!
//! Producers only ever see this trait; the real CSV store and the test
//! doubles used by the simulation harness implement it alike.

use crate::Reading;

/// Errors surfaced by a record sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The sink's queue is full right now; safe to retry after a backoff.
    Backpressure,
    /// The sink was closed; appending afterwards is a caller bug and is
    /// never retried.
    Closed,
    /// The backing store failed while writing or flushing.
    Io(String),
}

impl SinkError {
    /// Whether a failed append may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Backpressure)
    }
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backpressure => write!(f, "sink queue is full"),
            Self::Closed => write!(f, "sink is closed"),
            Self::Io(e) => write!(f, "sink I/O failure: {}", e),
        }
    }
}

impl std::error::Error for SinkError {}

/// An ordered, append-only destination for readings.
///
/// Implementations must make concurrent `append` calls linearizable: every
/// accepted record lands whole (never torn by another caller), and one
/// caller's accepted appends keep their call order. No ordering is promised
/// across callers.
///
/// `append` returning `Ok` means the record is durably queued: a subsequent
/// `close` flushes it to the backing store before returning. `close` is
/// idempotent; afterwards every `append` fails with [`SinkError::Closed`].
pub trait RecordSink: Send + Sync {
    fn append(&self, reading: Reading) -> Result<(), SinkError>;
    fn close(&self) -> Result<(), SinkError>;
}
