use backstop_rs::{BreakerError, CircuitBreaker, State};
use std::error::Error;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;

// Stand-in for an external service error
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

#[tokio::main]
async fn main() {
    // Create a circuit breaker with settings sized for a demo
    let breaker = CircuitBreaker::builder()
        .failure_threshold(50) // 50% failure rate will trip the circuit
        .minimum_requests(4) // after at least 4 requests in the window
        .reset_timeout(Duration::from_secs(2)) // 2 second cooldown before probing
        .build();

    println!("Circuit initial state: {:?}", breaker.state());

    let mut counter = 0u32;
    let call_service = |counter: &mut u32| -> Result<String, ServiceError> {
        *counter += 1;
        if *counter < 10 && *counter % 2 == 0 {
            // Simulate an error on even counts
            Err(ServiceError("External service error".to_string()))
        } else {
            Ok("Success".to_string())
        }
    };

    // Make 15 calls with the circuit breaker
    for i in 1..=15 {
        println!("\nAttempt {}: ", i);

        let result = breaker.execute(|| async { call_service(&mut counter) }).await;

        match result {
            Ok(value) => println!("Call succeeded with result: {}", value),
            Err(BreakerError::Open) => {
                println!("Circuit is open, waiting before retry...");
                sleep(Duration::from_secs(1)).await;
            }
            Err(BreakerError::Operation(err)) => {
                println!("Call failed with error: {}", err);
            }
            Err(err) => println!("Other error: {}", err),
        }

        let metrics = breaker.metrics();
        println!(
            "Current state: {:?}, failure rate: {:.2}%",
            metrics.state, metrics.failure_rate
        );

        if breaker.state() == State::HalfOpen {
            println!("Probing the service for recovery...");
        }

        sleep(Duration::from_millis(300)).await;
    }
}
