//! Minimal `execute` usage: wrap a flaky call and watch it trip.

use std::time::Duration;

use breaker::{BreakerError, CircuitBreaker, Settings, State};

fn flaky_call(attempt: usize) -> Result<&'static str, &'static str> {
    if attempt % 3 == 0 {
        Ok("payload")
    } else {
        Err("downstream timeout")
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let settings: Settings<&str> = Settings::new("payments-api")
        .adaptive(0.2, 5)
        .timeout(Duration::from_secs(5))
        .on_state_change(std::sync::Arc::new(|name: &str, from: State, to: State| {
            println!("{name}: {from} -> {to}");
        }));
    let breaker = CircuitBreaker::new(settings);

    for attempt in 0..20 {
        match breaker.execute(|| flaky_call(attempt)) {
            Ok(value) => println!("attempt {attempt}: ok ({value})"),
            Err(BreakerError::OpenState) => println!("attempt {attempt}: rejected, circuit open"),
            Err(BreakerError::TooManyRequests) => println!("attempt {attempt}: rejected, probe cap hit"),
            Err(BreakerError::Inner(err)) => println!("attempt {attempt}: downstream error ({err})"),
            Err(BreakerError::Cancelled) => unreachable!("this example never cancels"),
        }
    }

    println!("final diagnostics: {:?}", breaker.diagnostics());
}
