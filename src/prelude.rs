//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use backstop_rs::prelude::*;
//! ```

pub use crate::backoff::{BackoffConfig, BackoffStrategy, JitterStrategy};
pub use crate::breaker::{with_circuit_breaker, CircuitBreaker};
pub use crate::config::BreakerBuilder;
pub use crate::error::{BreakerError, RetryError};
pub use crate::extract::{ClientType, StandardizedError};
pub use crate::registry::extract_error;
pub use crate::retry::{retry, retry_with_signal, with_retry, RetryConfig};
pub use crate::state::State;
