//! Advanced walkthrough:
//!
//! 1. Observing state transitions through the hook registry
//! 2. Retrying a flaky call with jittered exponential backoff
//! 3. Classifying client-shaped errors through the extractor

use backstop_rs::{
    extract_error, retry, BackoffConfig, BackoffStrategy, BreakerError, CircuitBreaker,
    HookRegistry, JitterStrategy, RetryConfig,
};
use serde_json::json;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, serde::Serialize)]
struct ServiceError {
    status: u16,
    message: String,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (status {})", self.message, self.status)
    }
}

impl Error for ServiceError {}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Hooked circuit breaker ===\n");

    let hooks = HookRegistry::new();
    hooks.set_on_open(|| println!("[hook] circuit OPENED, failing fast"));
    hooks.set_on_close(|| println!("[hook] circuit CLOSED after recovery"));
    hooks.set_on_half_open(|| println!("[hook] circuit HALF-OPEN, probing"));

    let breaker = CircuitBreaker::builder()
        .failure_threshold(50)
        .minimum_requests(4)
        .success_threshold(2)
        .reset_timeout(Duration::from_millis(500))
        .hooks(hooks)
        .build();

    let calls = Arc::new(AtomicU32::new(0));
    for i in 1..=12 {
        let calls = Arc::clone(&calls);
        let result = breaker
            .execute(|| async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if (3..8).contains(&n) {
                    Err(ServiceError {
                        status: 503,
                        message: "temporarily unavailable".into(),
                    })
                } else {
                    Ok(format!("response #{n}"))
                }
            })
            .await;

        match result {
            Ok(value) => println!("call {i}: {value}"),
            Err(BreakerError::Operation(err)) => println!("call {i}: failed: {err}"),
            Err(err) => println!("call {i}: {err}"),
        }
        sleep(Duration::from_millis(150)).await;
    }

    println!("\n=== Retry with backoff ===\n");

    let attempts = AtomicU32::new(0);
    let config = RetryConfig::new()
        .max_attempts(4)
        .backoff(BackoffConfig::new(
            Duration::from_millis(50),
            Duration::from_millis(500),
            2.0,
            BackoffStrategy::Exponential,
        ))
        .jitter(JitterStrategy::Equal)
        .on_retry(|err, attempt, delay| {
            println!("attempt {attempt} failed ({err}), sleeping {}ms", delay.as_millis());
        });

    let result = retry(
        || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ServiceError {
                    status: 500,
                    message: "flaky".into(),
                })
            } else {
                Ok("settled")
            }
        },
        &config,
    )
    .await;
    println!("retry outcome: {:?}", result.map_err(|e| e.to_string()));

    println!("\n=== Error extraction ===\n");

    let record = extract_error(&json!({
        "isAxiosError": true,
        "response": {"status": 429, "data": {"message": "slow down"}},
        "config": {"url": "/v1/items", "method": "get"}
    }));
    println!(
        "client={} classification={} retryable={} status={:?}",
        record.client_type, record.classification, record.is_retryable, record.status_code
    );
}
