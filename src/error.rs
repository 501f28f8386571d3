//! Error types for the federation layer.
//!
//! Every component reports failures through [`Error`]. Write-path failures of
//! the embedded engine are mapped onto a small stable set of variants (see
//! [`local`](crate::local)) so callers never depend on engine internals.

use thiserror::Error;

/// Errors surfaced by the federation layer.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Invalid input rejected at construction time (bad regex, invalid
    /// external label, unreadable configuration file).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The fast-append reference is stale or unknown. Callers fall back to
    /// a full `add` with the series labels.
    #[error("not found")]
    NotFound,

    /// The sample is older than the most recent sample of its series.
    #[error("out of order sample")]
    OutOfOrderSample,

    /// A different value was already recorded for the same timestamp.
    #[error("duplicate sample for timestamp")]
    DuplicateSampleForTimestamp,

    /// The timestamp lies outside the currently writable time range.
    #[error("out of bounds")]
    OutOfBounds,

    /// The remote read backend failed or did not answer in time.
    #[error("remote read unavailable: {0}")]
    RemoteUnavailable(String),

    /// The request was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,

    /// The operation is not backed by the embedded engine yet.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// A programming invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),

    /// Embedded engine failure passed through without a stable mapping.
    #[error("storage error: {0}")]
    Storage(String),

    /// The admin HTTP server could not bind or serve.
    #[error("server error: {0}")]
    Server(String),
}

/// Result type alias for federation operations.
pub type Result<T> = std::result::Result<T, Error>;
