//! Configuration for circuit breakers.

use std::sync::Arc;
use std::time::Duration;

use crate::breaker::CircuitBreaker;
use crate::hook::HookRegistry;

/// Builder for creating circuit breakers with custom configurations.
///
/// Every numeric field is clamped to its valid range when the breaker is
/// built; out-of-range inputs adjust silently and never fail construction.
pub struct BreakerBuilder {
    failure_threshold: u32,
    minimum_requests: u64,
    rolling_window: Duration,
    reset_timeout: Duration,
    success_threshold: u32,
    half_open_max_requests: u32,
    bucket_count: usize,
    hooks: Arc<HookRegistry>,
}

impl Default for BreakerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            failure_threshold: 50,
            minimum_requests: 10,
            rolling_window: Duration::from_millis(60_000),
            reset_timeout: Duration::from_millis(30_000),
            success_threshold: 3,
            half_open_max_requests: 1,
            bucket_count: 10,
            hooks: Arc::new(HookRegistry::new()),
        }
    }

    /// Sets the failure percentage that trips the circuit. Clamped to
    /// `[1, 100]`.
    pub fn failure_threshold(mut self, percent: u32) -> Self {
        self.failure_threshold = percent;
        self
    }

    /// Sets the minimum number of windowed requests before the failure rate
    /// is considered. Clamped to at least 1.
    pub fn minimum_requests(mut self, count: u64) -> Self {
        self.minimum_requests = count;
        self
    }

    /// Sets the rolling window the failure rate is computed over. Clamped to
    /// at least one second.
    pub fn rolling_window(mut self, window: Duration) -> Self {
        self.rolling_window = window;
        self
    }

    /// Sets how long the circuit stays open before probing. Clamped to at
    /// least 100ms.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Sets the number of probe successes required to close from half-open.
    /// Clamped to at least 1.
    pub fn success_threshold(mut self, count: u32) -> Self {
        self.success_threshold = count;
        self
    }

    /// Sets the number of probes allowed in flight while half-open. Clamped
    /// to at least 1.
    pub fn half_open_max_requests(mut self, count: u32) -> Self {
        self.half_open_max_requests = count;
        self
    }

    /// Sets how many buckets the rolling window is divided into. Clamped to
    /// `[2, 60]`.
    pub fn bucket_count(mut self, count: usize) -> Self {
        self.bucket_count = count;
        self
    }

    /// Sets a hook registry for state transition callbacks.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Builds a circuit breaker with the configured (clamped) settings.
    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker::from_parts(
            self.failure_threshold.clamp(1, 100),
            self.minimum_requests.max(1),
            u64::try_from(self.rolling_window.as_millis())
                .unwrap_or(u64::MAX)
                .max(1000),
            u64::try_from(self.reset_timeout.as_millis())
                .unwrap_or(u64::MAX)
                .max(100),
            self.success_threshold.max(1),
            self.half_open_max_requests.max(1),
            self.bucket_count.clamp(2, 60),
            self.hooks,
        )
    }
}
