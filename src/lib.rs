//! # backstop-rs
//!
//! Client-side HTTP resilience primitives: a retry orchestrator with
//! jittered backoff, a windowed circuit breaker, and a standardized error
//! extractor, designed to compose.
//!
//! The library performs no I/O of its own. Callers hand it async operations
//! to run; it turns transient failures into retried successes and fails
//! fast while a collapsing dependency recovers. The extractor converts
//! heterogeneous client error shapes into one canonical record whose
//! classification drives the default retry policy, and the breaker wraps
//! operations that may themselves be retry loops.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod backoff;
mod breaker;
mod classify;
mod config;
mod error;
mod extract;
mod hook;
mod metrics;
pub mod prelude;
mod registry;
mod retry;
mod state;
mod store;

// Re-exports
pub use backoff::{apply_jitter, BackoffConfig, BackoffStrategy, JitterStrategy};
pub use breaker::{with_circuit_breaker, CircuitBreaker, GuardedOperation};
pub use classify::{
    classify_error, is_retryable_error, Classification, CANCELLED_CODES, NETWORK_CODES,
    RETRYABLE_STATUS_CODES, TIMEOUT_CODES,
};
pub use config::BreakerBuilder;
pub use error::{BreakerError, BreakerResult, RegistryError, RetryError, RetryResult, StoreError};
pub use extract::{
    detect_client_type, AxiosExtractor, ClientType, ErrorExtractor, FetchExtractor,
    GenericExtractor, GotExtractor, NodeFetchExtractor, StandardizedError, UndiciExtractor,
};
pub use hook::HookRegistry;
pub use metrics::{Bucket, BreakerMetrics};
pub use registry::{
    clear_extractors, create_error_predicate, default_retry_predicate, extract_error,
    list_extractors, register_extractor, unregister_extractor, CustomExtractor, ExtractorRegistry,
};
pub use retry::{retry, retry_with_signal, with_retry, RetryConfig};
pub use state::{BreakerState, State};
pub use store::{InMemoryStateStore, StateStore};

// The abort signal type accepted by `retry_with_signal`.
pub use tokio_util::sync::CancellationToken;
