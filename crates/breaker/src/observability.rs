//! Read-only snapshot views: [`Metrics`], [`Diagnostics`], and the optional
//! serde-friendly [`SettingsSnapshot`].

use std::time::{Duration, Instant};

use crate::counts::Counts;
use crate::state::State;

/// Point-in-time, internally consistent view of a breaker's state and
/// counts. Constructed from a single read of the state word, settings
/// pointer, and counts so that no field combination the caller can observe
/// is torn across a concurrent transition.
#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    /// Current operating mode.
    pub state: State,
    /// Current-generation counters.
    pub counts: Counts,
    /// `counts.failure_rate()`, provided directly for convenience.
    pub failure_rate: f64,
    /// `counts.success_rate()`, provided directly for convenience.
    pub success_rate: f64,
    /// When the breaker last transitioned (or was constructed, if never).
    pub state_changed_at: Instant,
    /// When counts were last zeroed (transition or interval roll).
    pub counts_cleared_at: Instant,
}

/// [`Metrics`] plus the settings a caller needs to reason about *why* the
/// breaker is behaving the way it is.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    /// Embedded point-in-time metrics.
    pub metrics: Metrics,
    /// Breaker name, duplicated here for convenience when `Diagnostics` is
    /// passed around independently of its owning breaker.
    pub name: String,
    /// Whether the adaptive predicate is active.
    pub adaptive_enabled: bool,
    /// Configured adaptive threshold, regardless of whether it is
    /// currently in effect.
    pub failure_rate_threshold: f64,
    /// Configured adaptive minimum observation count.
    pub minimum_observations: u64,
    /// Configured Open-state duration.
    pub timeout: Duration,
    /// Configured Half-Open admission cap.
    pub max_requests: u32,
    /// Configured Closed-state periodic reset window.
    pub interval: Duration,
    /// Would the trip predicate fire if one more failure were recorded
    /// right now? Early-warning signal, not a guarantee (concurrent
    /// admissions may change the picture before the next real outcome).
    pub will_trip_next: bool,
    /// Remaining time before the breaker becomes eligible to probe, or
    /// `Duration::ZERO` when not `Open`.
    pub time_until_half_open: Duration,
}

pub(crate) fn time_until_half_open(state: State, timeout: Duration, state_changed_at: Instant, now: Instant) -> Duration {
    if state != State::Open {
        return Duration::ZERO;
    }
    let elapsed = now.saturating_duration_since(state_changed_at);
    timeout.saturating_sub(elapsed)
}

/// Serde-friendly mirror of a [`crate::Settings`]'s plain-data fields
/// (closures and callbacks are not serializable and are omitted). Used for
/// the out-of-core admin-read and config-reload collaborators described at
/// the contract level only.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SettingsSnapshot {
    /// See [`crate::Settings::name`].
    pub name: String,
    /// See [`crate::Settings::max_requests`].
    pub max_requests: u32,
    /// See [`crate::Settings::interval`].
    pub interval: Duration,
    /// See [`crate::Settings::timeout`].
    pub timeout: Duration,
    /// See [`crate::Settings::adaptive_threshold`].
    pub adaptive_threshold: bool,
    /// See [`crate::Settings::failure_rate_threshold`].
    pub failure_rate_threshold: f64,
    /// See [`crate::Settings::minimum_observations`].
    pub minimum_observations: u64,
}

#[cfg(feature = "serde")]
impl<E> From<&crate::Settings<E>> for SettingsSnapshot {
    fn from(settings: &crate::Settings<E>) -> Self {
        Self {
            name: settings.name.clone(),
            max_requests: settings.max_requests,
            interval: settings.interval,
            timeout: settings.timeout,
            adaptive_threshold: settings.adaptive_threshold,
            failure_rate_threshold: settings.failure_rate_threshold,
            minimum_observations: settings.minimum_observations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_until_half_open_is_zero_outside_open() {
        let now = Instant::now();
        assert_eq!(
            time_until_half_open(State::Closed, Duration::from_secs(30), now, now),
            Duration::ZERO
        );
    }

    #[test]
    fn time_until_half_open_counts_down_while_open() {
        let opened_at = Instant::now();
        let now = opened_at;
        let remaining = time_until_half_open(State::Open, Duration::from_secs(30), opened_at, now);
        assert_eq!(remaining, Duration::from_secs(30));
    }
}
