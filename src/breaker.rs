//! Core circuit breaker implementation.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::config::BreakerBuilder;
use crate::error::{BreakerError, BreakerResult};
use crate::hook::HookRegistry;
use crate::metrics::{BreakerMetrics, SlidingWindow};
use crate::state::{BreakerState, State, StateManager};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn nonzero(value: u64) -> Option<u64> {
    (value != 0).then_some(value)
}

/// Inner state of the circuit breaker, shared between clones.
struct BreakerInner {
    state: StateManager,
    window: SlidingWindow,
    failure_threshold: f64,
    minimum_requests: u64,
    reset_timeout_ms: u64,
    success_threshold: u32,
    half_open_max_requests: u32,
    last_failure_ms: AtomicU64,
    last_success_ms: AtomicU64,
    half_open_successes: AtomicU32,
    half_open_active: AtomicU32,
    hooks: Arc<HookRegistry>,
}

/// Releases a reserved half-open probe slot when dropped, so the slot comes
/// back on every exit path of the probe.
struct ProbeGuard {
    inner: Arc<BreakerInner>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        // Saturating: a close/open transition may have already zeroed the
        // counter while this probe was still in flight.
        let _ = self
            .inner
            .half_open_active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                Some(active.saturating_sub(1))
            });
    }
}

enum Rejection {
    Open,
    Saturated,
}

impl Rejection {
    fn into_error<E>(self) -> BreakerError<E> {
        match self {
            Rejection::Open => BreakerError::Open,
            Rejection::Saturated => BreakerError::Saturated,
        }
    }
}

/// A circuit breaker that wraps calls to a collapsing dependency and fails
/// them fast once the dependency's windowed failure rate crosses the
/// configured threshold.
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

// Cloning is cheap: clones share the inner state.
impl Clone for CircuitBreaker {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        BreakerBuilder::new().build()
    }
}

impl CircuitBreaker {
    /// Creates a new builder for customizing a circuit breaker.
    pub fn builder() -> BreakerBuilder {
        BreakerBuilder::new()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        failure_threshold: u32,
        minimum_requests: u64,
        rolling_window_ms: u64,
        reset_timeout_ms: u64,
        success_threshold: u32,
        half_open_max_requests: u32,
        bucket_count: usize,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(BreakerInner {
                state: StateManager::new(State::Closed),
                window: SlidingWindow::new(rolling_window_ms, bucket_count),
                failure_threshold: f64::from(failure_threshold),
                minimum_requests,
                reset_timeout_ms,
                success_threshold,
                half_open_max_requests,
                last_failure_ms: AtomicU64::new(0),
                last_success_ms: AtomicU64::new(0),
                half_open_successes: AtomicU32::new(0),
                half_open_active: AtomicU32::new(0),
                hooks,
            }),
        }
    }

    /// Current state, after evaluating a pending open → half-open
    /// transition.
    ///
    /// The transition is lazy: it happens on whichever call observes that
    /// `reset_timeout` has elapsed since the last failure, and the
    /// half-open hook runs on that caller.
    pub fn state(&self) -> State {
        let current = self.inner.state.current();
        if current != State::Open {
            return current;
        }

        let last_failure = self.inner.last_failure_ms.load(Ordering::Acquire);
        if last_failure == 0
            || now_ms().saturating_sub(last_failure) < self.inner.reset_timeout_ms
        {
            return State::Open;
        }

        // Counters are reset before the swap: no probe can be admitted
        // while the state word still reads open.
        self.inner.half_open_successes.store(0, Ordering::Release);
        self.inner.half_open_active.store(0, Ordering::Release);
        if self.transition(State::Open, State::HalfOpen) {
            State::HalfOpen
        } else {
            self.inner.state.current()
        }
    }

    /// Executes an async operation guarded by the circuit breaker.
    ///
    /// Rejections (`Open`, `Saturated`) happen before the operation runs and
    /// are never recorded as failures. In half-open, a probe slot is
    /// reserved before the operation starts and released when it completes,
    /// whatever the outcome.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _guard = match self.admit() {
            Ok(guard) => guard,
            Err(rejection) => return Err(rejection.into_error()),
        };

        let result = operation().await;
        self.record(result.is_ok());
        result.map_err(BreakerError::Operation)
    }

    /// Records a success, for callers integrating the breaker by hand.
    /// Identical to the admitted-request path minus the admission check.
    pub fn record_success(&self) {
        self.record(true);
    }

    /// Records a failure, for callers integrating the breaker by hand.
    pub fn record_failure(&self) {
        self.record(false);
    }

    /// Live metrics over the rolling window.
    pub fn metrics(&self) -> BreakerMetrics {
        let state = self.state();
        let (successes, failures) = self.inner.window.totals(now_ms());
        let total = successes + failures;
        #[allow(clippy::cast_precision_loss)]
        let failure_rate = if total == 0 {
            0.0
        } else {
            failures as f64 / total as f64 * 100.0
        };

        BreakerMetrics {
            state,
            total_requests: total,
            failed_requests: failures,
            successful_requests: successes,
            failure_rate,
            last_failure_time: nonzero(self.inner.last_failure_ms.load(Ordering::Acquire)),
            last_success_time: nonzero(self.inner.last_success_ms.load(Ordering::Acquire)),
        }
    }

    /// Forces the breaker into a state, normalizing counters so the forced
    /// state behaves like an organically reached one: closing clears the
    /// ring, opening stamps the failure time so the breaker does not
    /// immediately leave open again, half-opening resets the probe
    /// counters. Fires the matching hook when the state actually changed.
    pub fn force_state(&self, target: State) -> bool {
        let current = self.inner.state.current();
        if current == target {
            return false;
        }

        match target {
            State::Open => {
                self.inner.last_failure_ms.store(now_ms(), Ordering::Release);
                self.inner.half_open_successes.store(0, Ordering::Release);
                self.inner.half_open_active.store(0, Ordering::Release);
            }
            State::HalfOpen => {
                self.inner.half_open_successes.store(0, Ordering::Release);
                self.inner.half_open_active.store(0, Ordering::Release);
            }
            State::Closed => {}
        }

        if !self.transition(current, target) {
            return false;
        }

        if target == State::Closed {
            self.inner.window.reset();
            self.inner.half_open_successes.store(0, Ordering::Release);
            self.inner.half_open_active.store(0, Ordering::Release);
        }
        true
    }

    /// Returns the breaker to a pristine closed state without firing hooks.
    pub fn reset(&self) {
        self.inner.state.set(State::Closed);
        self.inner.window.reset();
        self.inner.last_failure_ms.store(0, Ordering::Release);
        self.inner.last_success_ms.store(0, Ordering::Release);
        self.inner.half_open_successes.store(0, Ordering::Release);
        self.inner.half_open_active.store(0, Ordering::Release);
    }

    /// Captures the persistable state of the breaker.
    pub fn snapshot(&self) -> BreakerState {
        BreakerState {
            state: self.inner.state.current(),
            buckets: self.inner.window.snapshot(),
            last_failure_time: nonzero(self.inner.last_failure_ms.load(Ordering::Acquire)),
            last_success_time: nonzero(self.inner.last_success_ms.load(Ordering::Acquire)),
            half_open_successes: self.inner.half_open_successes.load(Ordering::Acquire),
            half_open_active_requests: self.inner.half_open_active.load(Ordering::Acquire),
        }
    }

    /// Loads previously captured state, without firing hooks.
    pub fn restore(&self, saved: &BreakerState) {
        self.inner.state.set(saved.state);
        self.inner.window.restore(&saved.buckets);
        self.inner
            .last_failure_ms
            .store(saved.last_failure_time.unwrap_or(0), Ordering::Release);
        self.inner
            .last_success_ms
            .store(saved.last_success_time.unwrap_or(0), Ordering::Release);
        self.inner
            .half_open_successes
            .store(saved.half_open_successes, Ordering::Release);
        self.inner
            .half_open_active
            .store(saved.half_open_active_requests, Ordering::Release);
    }

    /// Checks admission and, in half-open, reserves a probe slot.
    fn admit(&self) -> Result<Option<ProbeGuard>, Rejection> {
        match self.state() {
            State::Closed => Ok(None),
            State::Open => Err(Rejection::Open),
            State::HalfOpen => {
                let max = self.inner.half_open_max_requests;
                let reserved = self
                    .inner
                    .half_open_active
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                        (active < max).then_some(active + 1)
                    })
                    .is_ok();
                if reserved {
                    Ok(Some(ProbeGuard {
                        inner: Arc::clone(&self.inner),
                    }))
                } else {
                    Err(Rejection::Saturated)
                }
            }
        }
    }

    fn record(&self, success: bool) {
        let now = now_ms();
        if success {
            self.inner.window.record_success(now);
            self.inner.last_success_ms.store(now, Ordering::Release);
        } else {
            self.inner.window.record_failure(now);
            self.inner.last_failure_ms.store(now, Ordering::Release);
        }
        self.evaluate(success, now);
    }

    /// Eager transition evaluation after a recording.
    fn evaluate(&self, success: bool, now: u64) {
        match self.inner.state.current() {
            State::Closed => {
                let (successes, failures) = self.inner.window.totals(now);
                let total = successes + failures;
                if total < self.inner.minimum_requests {
                    return;
                }
                #[allow(clippy::cast_precision_loss)]
                let rate = failures as f64 / total as f64 * 100.0;
                if rate >= self.inner.failure_threshold {
                    self.inner.half_open_successes.store(0, Ordering::Release);
                    self.inner.half_open_active.store(0, Ordering::Release);
                    self.transition(State::Closed, State::Open);
                }
            }
            State::HalfOpen => {
                if success {
                    let successes =
                        self.inner.half_open_successes.fetch_add(1, Ordering::AcqRel) + 1;
                    if successes >= self.inner.success_threshold
                        && self.transition(State::HalfOpen, State::Closed)
                    {
                        self.inner.window.reset();
                        self.inner.half_open_successes.store(0, Ordering::Release);
                        self.inner.half_open_active.store(0, Ordering::Release);
                    }
                } else {
                    // A failed probe reopens immediately; stragglers keep
                    // their slots until completion and are ignored here.
                    self.inner.half_open_successes.store(0, Ordering::Release);
                    self.transition(State::HalfOpen, State::Open);
                }
            }
            State::Open => {}
        }
    }

    /// Performs a CAS transition; the winning caller logs and fires the
    /// observer hook.
    fn transition(&self, from: State, to: State) -> bool {
        if !self.inner.state.transition(from, to) {
            return false;
        }
        warn!(from = %from, to = %to, "circuit breaker state transition");
        self.inner.hooks.execute_state_transition_hook(to);
        true
    }
}

/// An operation bound to a dedicated circuit breaker.
///
/// Built by [`with_circuit_breaker`]; exposes the breaker for inspection.
pub struct GuardedOperation<F> {
    breaker: CircuitBreaker,
    operation: F,
}

impl<F> GuardedOperation<F> {
    /// The breaker guarding this operation.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Runs the operation through the breaker.
    pub async fn call<T, E, Fut>(&self) -> BreakerResult<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.breaker.execute(&self.operation).await
    }
}

/// Binds an operation factory to a new circuit breaker built from
/// `builder`.
pub fn with_circuit_breaker<F>(operation: F, builder: BreakerBuilder) -> GuardedOperation<F> {
    GuardedOperation {
        breaker: builder.build(),
        operation,
    }
}
