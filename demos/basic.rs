use resilient_fetch::{BreakerError, CircuitBreaker, HookRegistry};
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

// Fails on calls 4 through 8, then recovers.
fn call_service(counter: &mut u32) -> Result<String, ServiceError> {
    *counter += 1;
    if (4..=8).contains(counter) {
        Err(ServiceError("External service error".to_string()))
    } else {
        Ok("Success".to_string())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let hooks = HookRegistry::new();
    hooks.set_on_transition(|t| println!("  >> transition {} -> {}", t.from, t.to));

    let breaker = CircuitBreaker::<ServiceError>::builder()
        .failure_threshold(3)
        .success_threshold(2)
        .recovery_timeout(Duration::from_secs(2))
        .hooks(hooks)
        .build()?;

    println!("Circuit initial state: {}", breaker.state());

    let mut counter = 0;
    for i in 1..=15 {
        println!("\nAttempt {}:", i);

        match breaker.call(|| call_service(&mut counter)) {
            Ok(result) => println!("Call succeeded with result: {}", result),
            Err(BreakerError::Open) => println!("Circuit is open, call skipped"),
            Err(BreakerError::Operation(err)) => println!("Call failed with error: {}", err),
        }

        let stats = breaker.stats();
        println!(
            "Current state: {}, consecutive failures: {}, times opened: {}",
            stats.state, stats.consecutive_failures, stats.times_opened
        );

        thread::sleep(Duration::from_millis(400));
    }

    Ok(())
}
