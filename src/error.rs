//! Error types for the circuit breaker and its builder.

use thiserror::Error;

/// Result type for guarded calls.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Error returned by [`CircuitBreaker::call`](crate::CircuitBreaker::call).
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open (or a half-open trial is already in flight); the
    /// operation was not invoked.
    #[error("circuit breaker is open")]
    Open,

    /// The operation was invoked and failed. Its error is passed through
    /// unchanged whether or not the breaker counted it.
    #[error("operation failed: {0}")]
    Operation(#[source] E),
}

impl<E> BreakerError<E> {
    /// Returns true if the call was rejected without invoking the operation.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open)
    }

    /// Returns the operation's error, if the operation ran.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Open => None,
            BreakerError::Operation(e) => Some(e),
        }
    }
}

/// Invalid breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `failure_threshold` must be at least 1.
    #[error("failure threshold must be greater than zero")]
    ZeroFailureThreshold,

    /// `success_threshold` must be at least 1.
    #[error("success threshold must be greater than zero")]
    ZeroSuccessThreshold,

    /// `build_with_policy` was called without a policy.
    #[error("a policy must be provided when not using DefaultPolicy")]
    MissingPolicy,
}
