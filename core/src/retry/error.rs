use thiserror::Error;

/// Errors surfaced by the retry manager
#[derive(Error, Debug)]
pub enum RetryError {
    /// A retry for this key is already in flight
    #[error("Operation '{key}' is already retrying")]
    Concurrent { key: String },

    /// The retry loop was cancelled via `cancel_retry`
    #[error("Retry for '{key}' was cancelled")]
    Cancelled { key: String },

    /// All attempts failed; carries the last attempt's error
    #[error("Operation failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
}

/// A single attempt exceeded its timeout
///
/// Wrapped in `anyhow::Error` so it flows through `retry_if` /
/// `on_retry` like any other attempt failure.
#[derive(Error, Debug)]
#[error("Operation timed out after {0}ms")]
pub struct AttemptTimeout(pub u64);

/// Result type for retry operations
pub type RetryResult<T> = Result<T, RetryError>;
