//! Per-generation tally of requests, successes, failures, and streaks.

use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time view of a breaker's counters for the current generation.
///
/// `requests == total_successes + total_failures` for any snapshot taken
/// between admissions (no call is in flight); while a call is outstanding,
/// `requests` already reflects it but neither terminal field does yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Counts {
    /// Total calls admitted in the current generation.
    pub requests: u64,
    /// Terminal successes admitted in the current generation.
    pub total_successes: u64,
    /// Terminal failures admitted in the current generation.
    pub total_failures: u64,
    /// Length of the current unbroken run of successes.
    pub consecutive_successes: u64,
    /// Length of the current unbroken run of failures.
    pub consecutive_failures: u64,
}

impl Counts {
    /// Fraction of terminal calls that failed, or `0.0` if none have
    /// terminated yet.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.total_failures as f64 / self.requests as f64;
            rate
        }
    }

    /// Fraction of terminal calls that succeeded, or `0.0` if none have
    /// terminated yet.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let rate = self.total_successes as f64 / self.requests as f64;
            rate
        }
    }

    /// `Counts` as they would read after one more call were admitted and
    /// recorded as a failure, without mutating anything. Used by
    /// [`crate::Diagnostics::will_trip_next`].
    #[must_use]
    pub(crate) fn with_one_more_failure(&self) -> Self {
        Self {
            requests: self.requests + 1,
            total_successes: self.total_successes,
            total_failures: self.total_failures + 1,
            consecutive_successes: 0,
            consecutive_failures: self.consecutive_failures + 1,
        }
    }
}

/// Atomic storage backing [`Counts`]; mutated only through the state
/// machine so that generation tagging stays consistent with the values.
#[derive(Debug, Default)]
pub(crate) struct AtomicCounts {
    requests: AtomicU64,
    total_successes: AtomicU64,
    total_failures: AtomicU64,
    consecutive_successes: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl AtomicCounts {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn snapshot(&self) -> Counts {
        Counts {
            requests: self.requests.load(Ordering::Acquire),
            total_successes: self.total_successes.load(Ordering::Acquire),
            total_failures: self.total_failures.load(Ordering::Acquire),
            consecutive_successes: self.consecutive_successes.load(Ordering::Acquire),
            consecutive_failures: self.consecutive_failures.load(Ordering::Acquire),
        }
    }

    pub(crate) fn reset(&self) {
        self.requests.store(0, Ordering::Release);
        self.total_successes.store(0, Ordering::Release);
        self.total_failures.store(0, Ordering::Release);
        self.consecutive_successes.store(0, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }

    pub(crate) fn on_admit(&self) {
        self.requests.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn on_success(&self) {
        self.total_successes.fetch_add(1, Ordering::AcqRel);
        self.consecutive_successes.fetch_add(1, Ordering::AcqRel);
        self.consecutive_failures.store(0, Ordering::Release);
    }

    pub(crate) fn on_failure(&self) {
        self.total_failures.fetch_add(1, Ordering::AcqRel);
        self.consecutive_failures.fetch_add(1, Ordering::AcqRel);
        self.consecutive_successes.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_zero_before_any_request() {
        let counts = Counts::default();
        assert_eq!(counts.failure_rate(), 0.0);
        assert_eq!(counts.success_rate(), 0.0);
    }

    #[test]
    fn streaks_are_exclusive() {
        let atomic = AtomicCounts::new();
        atomic.on_admit();
        atomic.on_success();
        atomic.on_admit();
        atomic.on_failure();
        let snapshot = atomic.snapshot();
        assert_eq!(snapshot.consecutive_successes, 0);
        assert_eq!(snapshot.consecutive_failures, 1);
    }

    #[test]
    fn reset_zeroes_every_field() {
        let atomic = AtomicCounts::new();
        atomic.on_admit();
        atomic.on_failure();
        atomic.reset();
        assert_eq!(atomic.snapshot(), Counts::default());
    }
}
