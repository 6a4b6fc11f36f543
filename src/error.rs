//! Error types for the resilience primitives.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// Result type for breaker-guarded operations.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Result type for retried operations.
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Error raised by a circuit breaker or the operation it guards.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The circuit is open, calls are not permitted.
    Open,

    /// The circuit is half-open and every probe slot is taken.
    Saturated,

    /// The underlying operation failed.
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Whether this is a rejection raised by the breaker itself rather than
    /// a failure of the guarded operation.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::Open | BreakerError::Saturated)
    }
}

impl<E: Display> Display for BreakerError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open => write!(f, "Circuit breaker is open"),
            BreakerError::Saturated => {
                write!(f, "Circuit breaker is half-open and at probe capacity")
            }
            BreakerError::Operation(e) => write!(f, "Operation error: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Error captured from a retry loop: the last attempt's failure, a
/// per-attempt timeout, or the caller's cancellation.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The operation failed; carries the caller's error unchanged.
    Operation(E),

    /// An attempt exceeded the configured per-attempt timeout.
    Timeout(Duration),

    /// The abort signal fired before or during the retry loop.
    Cancelled,
}

impl<E> RetryError<E> {
    /// The underlying operation error, when there is one.
    pub fn operation(&self) -> Option<&E> {
        match self {
            RetryError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Consumes the error, returning the operation error when there is one.
    pub fn into_operation(self) -> Option<E> {
        match self {
            RetryError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the retry loop was cancelled by the abort signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled)
    }
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Operation(e) => write!(f, "{}", e),
            RetryError::Timeout(limit) => {
                write!(f, "Operation timed out after {}ms", limit.as_millis())
            }
            RetryError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RetryError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

/// Error raised by a state store implementation.
#[derive(Debug)]
pub enum StoreError {
    /// The backing store could not serve the request.
    Backend(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "State store error: {}", msg),
        }
    }
}

impl Error for StoreError {}

/// Error raised when mutating an extractor registry.
#[derive(Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// An extractor with this name is already registered.
    DuplicateName(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateName(name) => {
                write!(f, "Extractor '{}' is already registered", name)
            }
        }
    }
}

impl Error for RegistryError {}
