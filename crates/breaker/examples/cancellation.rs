//! `execute_with_cancellation`: reject before admission if the caller has
//! already given up.

use breaker::{BreakerError, CancellationToken, CircuitBreaker, Settings};

fn main() {
    let breaker = CircuitBreaker::new(Settings::<&str>::new("search-index"));
    let token = CancellationToken::new();

    token.cancel();
    match breaker.execute_with_cancellation(&token, || Ok::<_, &str>("results")) {
        Err(BreakerError::Cancelled) => println!("caller cancelled before admission, as expected"),
        other => println!("unexpected: {other:?}"),
    }

    let fresh_token = CancellationToken::new();
    match breaker.execute_with_cancellation(&fresh_token, || Ok::<_, &str>("results")) {
        Ok(value) => println!("admitted and succeeded: {value}"),
        other => println!("unexpected: {other:?}"),
    }
}
