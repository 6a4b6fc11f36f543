//! Retry orchestration with backoff, jitter, timeouts, and cancellation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::{apply_jitter, BackoffConfig, JitterStrategy};
use crate::error::{RetryError, RetryResult};
use crate::registry::default_retry_predicate;

type Predicate<E> = Arc<dyn Fn(&RetryError<E>, u32) -> bool + Send + Sync>;
type RetryHook<E> = Arc<dyn Fn(&RetryError<E>, u32, Duration) + Send + Sync>;
type FailureHook<E> = Arc<dyn Fn(&RetryError<E>, u32) + Send + Sync>;

/// Configuration for a retry loop over operations failing with `E`.
pub struct RetryConfig<E> {
    max_attempts: u32,
    backoff: BackoffConfig,
    jitter: JitterStrategy,
    timeout: Option<Duration>,
    should_retry: Predicate<E>,
    on_retry: Option<RetryHook<E>>,
    on_failure: Option<FailureHook<E>>,
}

impl<E> Clone for RetryConfig<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff.clone(),
            jitter: self.jitter,
            timeout: self.timeout,
            should_retry: Arc::clone(&self.should_retry),
            on_retry: self.on_retry.clone(),
            on_failure: self.on_failure.clone(),
        }
    }
}

impl<E: Serialize> Default for RetryConfig<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Serialize> RetryConfig<E> {
    /// Creates a config with the default extractor-routed predicate:
    /// timeouts retry, cancellation never retries, and operation errors
    /// retry when their extracted classification is retryable.
    pub fn new() -> Self {
        Self::with_predicate(|error: &RetryError<E>, _attempt| match error {
            RetryError::Timeout(_) => true,
            RetryError::Cancelled => false,
            RetryError::Operation(e) => default_retry_predicate(e),
        })
    }
}

impl<E> RetryConfig<E> {
    /// Creates a config with an explicit retry predicate. The predicate is
    /// authoritative even when an error looks transient.
    pub fn with_predicate<P>(predicate: P) -> Self
    where
        P: Fn(&RetryError<E>, u32) -> bool + Send + Sync + 'static,
    {
        Self {
            max_attempts: 3,
            backoff: BackoffConfig::default(),
            jitter: JitterStrategy::Full,
            timeout: None,
            should_retry: Arc::new(predicate),
            on_retry: None,
            on_failure: None,
        }
    }

    /// Sets the total attempt budget. `1` means the operation runs exactly
    /// once. Clamped to at least 1.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the base delay curve.
    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the jitter strategy applied to each computed delay.
    pub fn jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets a per-attempt timeout. A timed-out attempt is captured as
    /// [`RetryError::Timeout`] and consults the predicate like any other
    /// failure.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replaces the retry predicate.
    pub fn should_retry<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&RetryError<E>, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Arc::new(predicate);
        self
    }

    /// Sets a callback invoked before each backoff sleep with the captured
    /// error, the 1-indexed attempt that failed, and the chosen delay.
    pub fn on_retry<C>(mut self, callback: C) -> Self
    where
        C: Fn(&RetryError<E>, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(callback));
        self
    }

    /// Sets a callback invoked once when the loop gives up, with the final
    /// error and the number of attempts made.
    pub fn on_failure<C>(mut self, callback: C) -> Self
    where
        C: Fn(&RetryError<E>, u32) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(callback));
        self
    }
}

/// Executes `operation` up to `max_attempts` times, sleeping a jittered
/// backoff delay between attempts.
///
/// Returns the first success, or the last captured error once the predicate
/// refuses to retry or the attempt budget is spent. Panics raised by the
/// predicate or a callback are not caught; they replace the in-flight error
/// and propagate to the caller.
pub async fn retry<T, E, F, Fut>(mut operation: F, config: &RetryConfig<E>) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    run_loop(config, None, move |_signal| operation()).await
}

/// Like [`retry`], with an abort signal.
///
/// The signal is checked before each attempt and honored during each backoff
/// sleep; either fails the call with [`RetryError::Cancelled`]. Every
/// attempt receives a child token of `signal`, which is additionally
/// cancelled when the per-attempt timeout wins the race, so operations that
/// observe their token stop doing work the moment it no longer matters.
pub async fn retry_with_signal<T, E, F, Fut>(
    mut operation: F,
    signal: &CancellationToken,
    config: &RetryConfig<E>,
) -> RetryResult<T, E>
where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    run_loop(config, Some(signal), move |child| {
        operation(child.unwrap_or_default())
    })
    .await
}

/// Wraps an operation factory into a call-ready retrying function.
pub fn with_retry<T, E, F, Fut>(
    f: F,
    config: RetryConfig<E>,
) -> impl Fn() -> BoxFuture<'static, RetryResult<T, E>>
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + Sync + 'static,
{
    move || {
        let f = f.clone();
        let config = config.clone();
        async move { retry(f, &config).await }.boxed()
    }
}

async fn run_loop<T, E, F, Fut>(
    config: &RetryConfig<E>,
    signal: Option<&CancellationToken>,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(Option<CancellationToken>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    #[allow(clippy::cast_precision_loss)]
    let mut prev_delay_ms = config.backoff.initial_delay().as_millis() as f64;
    let mut attempt = 0u32;

    loop {
        if signal.is_some_and(CancellationToken::is_cancelled) {
            return Err(RetryError::Cancelled);
        }

        let child = signal.map(CancellationToken::child_token);
        let error = match run_attempt(config.timeout, child, &mut operation).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(
                        total_attempts = attempt + 1,
                        "operation succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let refused = !(config.should_retry)(&error, attempt);
        if refused || attempt + 1 >= config.max_attempts {
            warn!(
                attempts = attempt + 1,
                refused,
                error = %error,
                "operation failed, giving up"
            );
            if let Some(hook) = &config.on_failure {
                hook(&error, attempt + 1);
            }
            return Err(error);
        }

        let base = config.backoff.base_delay_ms(attempt);
        let delay_ms = apply_jitter(&config.backoff, base, config.jitter, prev_delay_ms);
        prev_delay_ms = delay_ms;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let delay = Duration::from_millis(delay_ms.max(0.0) as u64);

        if let Some(hook) = &config.on_retry {
            hook(&error, attempt + 1, delay);
        }
        debug!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "retrying after failure"
        );

        match signal {
            Some(token) => tokio::select! {
                () = token.cancelled() => return Err(RetryError::Cancelled),
                () = sleep(delay) => {}
            },
            None => sleep(delay).await,
        }

        attempt += 1;
    }
}

async fn run_attempt<T, E, F, Fut>(
    timeout: Option<Duration>,
    child: Option<CancellationToken>,
    operation: &mut F,
) -> RetryResult<T, E>
where
    F: FnMut(Option<CancellationToken>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    match timeout {
        Some(limit) => {
            let aborter = child.clone();
            match tokio::time::timeout(limit, operation(child)).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(RetryError::Operation(error)),
                Err(_) => {
                    // The timer won: tell the (possibly still running)
                    // operation its work no longer matters.
                    if let Some(token) = aborter {
                        token.cancel();
                    }
                    Err(RetryError::Timeout(limit))
                }
            }
        }
        None => operation(child).await.map_err(RetryError::Operation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::BackoffStrategy;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, serde::Serialize)]
    struct TestError {
        status: u16,
        message: String,
    }

    impl TestError {
        fn server(msg: &str) -> Self {
            Self {
                status: 500,
                message: msg.to_string(),
            }
        }

        fn not_found(msg: &str) -> Self {
            Self {
                status: 404,
                message: msg.to_string(),
            }
        }
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{} ({})", self.message, self.status)
        }
    }

    impl std::error::Error for TestError {}

    fn fast_config() -> RetryConfig<TestError> {
        RetryConfig::new()
            .backoff(BackoffConfig::new(
                Duration::from_millis(1),
                Duration::from_millis(5),
                2.0,
                BackoffStrategy::Exponential,
            ))
            .jitter(JitterStrategy::None)
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result = retry(
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::server("flaky"))
                } else {
                    Ok(42)
                }
            },
            &fast_config().max_attempts(5),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_error_and_fires_on_failure() {
        let calls = AtomicU32::new(0);
        let reported = Arc::new(AtomicU32::new(0));
        let reported_clone = Arc::clone(&reported);

        let config = fast_config().max_attempts(3).on_failure(move |_err, attempts| {
            reported_clone.store(attempts, Ordering::SeqCst);
        });

        let result: RetryResult<(), _> = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::server("boom"))
            },
            &config,
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.operation().unwrap().message, "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(reported.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_verdict_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: RetryResult<(), _> = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::not_found("missing"))
            },
            &fast_config().max_attempts(5),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_attempt_budget_never_retries() {
        let calls = AtomicU32::new(0);
        let result: RetryResult<(), _> = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::server("once"))
            },
            &fast_config().max_attempts(1),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_before_start_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();

        let calls = AtomicU32::new(0);
        let result: RetryResult<(), _> = retry_with_signal(
            |_signal| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::server("unreached"))
            },
            &token,
            &fast_config(),
        )
        .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn abort_during_sleep_short_circuits() {
        let token = CancellationToken::new();
        let config = RetryConfig::<TestError>::new()
            .max_attempts(3)
            .backoff(BackoffConfig::new(
                Duration::from_secs(10),
                Duration::from_secs(10),
                2.0,
                BackoffStrategy::Constant,
            ))
            .jitter(JitterStrategy::None);

        let canceller = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let calls = AtomicU32::new(0);
        let started = std::time::Instant::now();
        let result: RetryResult<(), _> = retry_with_signal(
            |_signal| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::server("flaky"))
            },
            &token,
            &config,
        )
        .await;

        assert!(result.unwrap_err().is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn timed_out_attempt_is_retried_then_reported() {
        let calls = AtomicU32::new(0);
        let config = fast_config().max_attempts(2).timeout(Duration::from_millis(10));

        let result: RetryResult<(), _> = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_secs(30)).await;
                Ok(())
            },
            &config,
        )
        .await;

        assert!(matches!(result.unwrap_err(), RetryError::Timeout(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn timeout_cancels_the_attempt_token() {
        let token = CancellationToken::new();
        let config = fast_config().max_attempts(1).timeout(Duration::from_millis(10));

        let observed = Arc::new(tokio::sync::Mutex::new(None));
        let observed_clone = Arc::clone(&observed);
        let result: RetryResult<(), _> = retry_with_signal(
            move |signal| {
                let observed = Arc::clone(&observed_clone);
                async move {
                    *observed.lock().await = Some(signal.clone());
                    sleep(Duration::from_secs(30)).await;
                    Ok(())
                }
            },
            &token,
            &config,
        )
        .await;

        assert!(matches!(result.unwrap_err(), RetryError::Timeout(_)));
        let child = observed.lock().await.take().unwrap();
        assert!(child.is_cancelled());
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn on_retry_sees_attempt_and_delay() {
        let seen: Arc<parking_lot::Mutex<Vec<(u32, u64)>>> =
            Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let config = RetryConfig::<TestError>::new()
            .max_attempts(3)
            .backoff(BackoffConfig::new(
                Duration::from_millis(1),
                Duration::from_millis(100),
                2.0,
                BackoffStrategy::Exponential,
            ))
            .jitter(JitterStrategy::None)
            .on_retry(move |_err, attempt, delay| {
                seen_clone.lock().push((attempt, delay.as_millis() as u64));
            });

        let _: RetryResult<(), _> =
            retry(|| async { Err(TestError::server("boom")) }, &config).await;

        let calls = seen.lock();
        assert_eq!(calls.as_slice(), &[(1, 1), (2, 2)]);
    }

    #[tokio::test]
    async fn explicit_predicate_overrides_classification() {
        // The error classifies as retryable (500) but the predicate refuses.
        let calls = AtomicU32::new(0);
        let config = RetryConfig::<TestError>::with_predicate(|_err, _attempt| false)
            .max_attempts(5)
            .jitter(JitterStrategy::None);

        let result: RetryResult<(), _> = retry(
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(TestError::server("transient-looking"))
            },
            &config,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrapped_fn_retries_like_the_loop() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let wrapped = with_retry(
            move || {
                let calls = Arc::clone(&calls_clone);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 1 {
                        Err(TestError::server("flaky"))
                    } else {
                        Ok("done")
                    }
                }
            },
            fast_config().max_attempts(3),
        );

        assert_eq!(wrapped().await.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // The wrapper is reusable.
        calls.store(5, Ordering::SeqCst);
        assert_eq!(wrapped().await.unwrap(), "done");
    }
}
