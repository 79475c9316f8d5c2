//! Trip predicates: pure functions from [`Counts`] to a trip decision.

use std::sync::Arc;

use crate::counts::Counts;

/// A pure, side-effect-free function consulted after every recorded outcome
/// to decide whether the breaker should trip to `Open`.
///
/// Implementations must be cheap: the execute pipeline may call this once
/// per completed operation.
pub type Predicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Default predicate when `adaptive_threshold` is disabled: trips on the
/// 6th consecutive failure.
#[must_use]
pub fn absolute() -> Predicate {
    Arc::new(|counts: &Counts| counts.consecutive_failures > 5)
}

/// Default predicate when `adaptive_threshold` is enabled. Ignores
/// `total_failures / requests` until at least `minimum_observations` calls
/// have been admitted, then trips on a strict majority over
/// `failure_rate_threshold`.
///
/// The comparison is strict: a failure rate exactly equal to the threshold
/// does not trip.
#[must_use]
pub fn adaptive(failure_rate_threshold: f64, minimum_observations: u64) -> Predicate {
    Arc::new(move |counts: &Counts| {
        if counts.requests < minimum_observations {
            return false;
        }
        counts.failure_rate() > failure_rate_threshold
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts_with(requests: u64, total_failures: u64, consecutive_failures: u64) -> Counts {
        Counts {
            requests,
            total_successes: requests - total_failures,
            total_failures,
            consecutive_successes: 0,
            consecutive_failures,
        }
    }

    #[test]
    fn absolute_trips_on_sixth_consecutive_failure() {
        let predicate = absolute();
        assert!(!predicate(&counts_with(5, 5, 5)));
        assert!(predicate(&counts_with(6, 6, 6)));
    }

    #[test]
    fn adaptive_ignores_counts_below_minimum_observations() {
        let predicate = adaptive(0.05, 20);
        assert!(!predicate(&counts_with(19, 19, 19)));
    }

    #[test]
    fn adaptive_threshold_is_strict() {
        let predicate = adaptive(0.5, 1);
        assert!(!predicate(&counts_with(10, 5, 5)));
        assert!(predicate(&counts_with(10, 6, 6)));
    }
}
