//! `update_settings`: retune a live breaker without losing in-flight calls.

use std::time::Duration;

use breaker::{CircuitBreaker, PartialSettings, Settings};

fn main() {
    let breaker = CircuitBreaker::new(Settings::<&str>::new("ingest").adaptive(0.05, 20));

    println!("before: {:?}", breaker.diagnostics());

    breaker
        .update_settings(
            PartialSettings::new()
                .failure_rate_threshold(0.1)
                .timeout(Duration::from_secs(15)),
        )
        .expect("valid partial update");

    println!("after: {:?}", breaker.diagnostics());

    // An invalid update is rejected and leaves the previous snapshot intact.
    let err = breaker
        .update_settings(PartialSettings::new().failure_rate_threshold(2.0))
        .unwrap_err();
    println!("rejected update: {err}");
    println!("unchanged: {:?}", breaker.diagnostics());
}
