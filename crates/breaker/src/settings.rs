//! Immutable settings snapshot, its builder, and the partial-update merge.

use std::sync::Arc;
use std::time::Duration;

use crate::classifier::{self, Classifier};
use crate::error::SettingsError;
use crate::predicate::{self, Predicate};
use crate::state::State;

/// Observer invoked synchronously on every genuine state transition.
///
/// Panics raised from this callback are caught and logged by the breaker;
/// they never propagate into breaker state or the caller's call stack.
pub type StateChangeCallback = Arc<dyn Fn(&str, State, State) + Send + Sync>;

/// Immutable configuration snapshot for a [`crate::CircuitBreaker`].
///
/// Built with the fluent setters below, then handed to
/// [`crate::CircuitBreaker::new`] or [`crate::CircuitBreaker::try_new`].
/// Updated in place via [`crate::CircuitBreaker::update_settings`], which
/// takes a [`PartialSettings`] merged onto the breaker's current snapshot.
pub struct Settings<E> {
    /// Identifier used in callbacks and diagnostics.
    pub name: String,
    /// Admission cap while Half-Open. Zero is defaulted to `1` at
    /// construction and rejected as an error on update.
    pub max_requests: u32,
    /// Periodic count-reset window while Closed. `Duration::ZERO` disables
    /// periodic resets.
    pub interval: Duration,
    /// Duration the breaker remains Open before first probe eligibility.
    /// Zero is defaulted to 60s at construction and rejected as an error on
    /// update.
    pub timeout: Duration,
    ready_to_trip: Predicate,
    custom_predicate: bool,
    /// Classifies the wrapped operation's error into [`crate::Outcome`].
    pub is_successful: Classifier<E>,
    /// Invoked synchronously from the transitioning caller on every
    /// genuine state change.
    pub on_state_change: Option<StateChangeCallback>,
    /// Selects the adaptive (percentage-based) default trip predicate over
    /// the absolute (consecutive-failure) one, when `ready_to_trip` has not
    /// been explicitly overridden.
    pub adaptive_threshold: bool,
    /// Strict upper bound `(0, 1)` for the adaptive predicate. `0` is
    /// defaulted to `0.05` in both construction and update contexts.
    pub failure_rate_threshold: f64,
    /// Minimum admitted requests before the adaptive predicate activates.
    /// Zero is defaulted to `20` at construction and rejected as an error
    /// on update.
    pub minimum_observations: u64,
}

impl<E> Clone for Settings<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            max_requests: self.max_requests,
            interval: self.interval,
            timeout: self.timeout,
            ready_to_trip: Arc::clone(&self.ready_to_trip),
            custom_predicate: self.custom_predicate,
            is_successful: Arc::clone(&self.is_successful),
            on_state_change: self.on_state_change.clone(),
            adaptive_threshold: self.adaptive_threshold,
            failure_rate_threshold: self.failure_rate_threshold,
            minimum_observations: self.minimum_observations,
        }
    }
}

impl<E> Settings<E>
where
    E: Send + Sync + 'static,
{
    /// Defaults: absolute predicate, default classifier, `max_requests`
    /// 1, `interval` disabled, `timeout` 60s, adaptive off.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_requests: 1,
            interval: Duration::ZERO,
            timeout: Duration::from_secs(60),
            ready_to_trip: predicate::absolute(),
            custom_predicate: false,
            is_successful: classifier::default_classifier(),
            on_state_change: None,
            adaptive_threshold: false,
            failure_rate_threshold: 0.05,
            minimum_observations: 20,
        }
    }

    /// Enables the adaptive predicate with the given threshold and minimum
    /// observation count. Has no effect on a predicate previously set via
    /// [`Settings::ready_to_trip`].
    #[must_use]
    pub fn adaptive(mut self, failure_rate_threshold: f64, minimum_observations: u64) -> Self {
        self.adaptive_threshold = true;
        self.failure_rate_threshold = failure_rate_threshold;
        self.minimum_observations = minimum_observations;
        self
    }

    /// Overrides the trip predicate outright, bypassing both built-in
    /// defaults. `adaptive_threshold`/`failure_rate_threshold`/
    /// `minimum_observations` remain as diagnostic fields only.
    #[must_use]
    pub fn ready_to_trip(mut self, predicate: Predicate) -> Self {
        self.ready_to_trip = predicate;
        self.custom_predicate = true;
        self
    }

    /// Overrides the outcome classifier.
    #[must_use]
    pub fn is_successful(mut self, classifier: Classifier<E>) -> Self {
        self.is_successful = classifier;
        self
    }

    /// Registers a state-change observer.
    #[must_use]
    pub fn on_state_change(mut self, callback: StateChangeCallback) -> Self {
        self.on_state_change = Some(callback);
        self
    }

    /// Sets the Half-Open admission cap.
    #[must_use]
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Sets the Closed-state periodic reset window.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets how long the breaker stays Open before probing.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn ready_to_trip_fn(&self) -> &Predicate {
        &self.ready_to_trip
    }

    /// Applies construction- or update-time defaulting and validation.
    ///
    /// `at_construction = true` silently substitutes defaults for zero
    /// values (spec §4.2 items 1/3/5); `false` rejects them as
    /// [`SettingsError`] instead, leaving no field touched on failure
    /// (the caller is expected to operate on a scratch clone).
    pub(crate) fn normalize(&mut self, at_construction: bool) -> Result<(), SettingsError> {
        if self.max_requests == 0 {
            if at_construction {
                self.max_requests = 1;
            } else {
                return Err(SettingsError::MaxRequestsZero);
            }
        }

        if self.timeout.is_zero() {
            if at_construction {
                self.timeout = Duration::from_secs(60);
            } else {
                return Err(SettingsError::TimeoutZero);
            }
        }

        if self.minimum_observations == 0 {
            if at_construction {
                self.minimum_observations = 20;
            } else {
                return Err(SettingsError::MinimumObservationsZero);
            }
        }

        if self.adaptive_threshold {
            if self.failure_rate_threshold == 0.0 {
                self.failure_rate_threshold = 0.05;
            } else if !(0.0..1.0).contains(&self.failure_rate_threshold) {
                return Err(SettingsError::FailureRateThresholdOutOfRange);
            }
        }

        if !self.custom_predicate {
            self.ready_to_trip = if self.adaptive_threshold {
                predicate::adaptive(self.failure_rate_threshold, self.minimum_observations)
            } else {
                predicate::absolute()
            };
        }

        Ok(())
    }

    /// Merges a [`PartialSettings`] onto this snapshot, producing a
    /// candidate that has not yet been validated. The receiver is left
    /// untouched.
    pub(crate) fn merged_with(&self, partial: PartialSettings<E>) -> Self {
        let predicate_overridden = partial.ready_to_trip.is_some();
        Self {
            name: partial.name.unwrap_or_else(|| self.name.clone()),
            max_requests: partial.max_requests.unwrap_or(self.max_requests),
            interval: partial.interval.unwrap_or(self.interval),
            timeout: partial.timeout.unwrap_or(self.timeout),
            ready_to_trip: partial.ready_to_trip.unwrap_or_else(|| Arc::clone(&self.ready_to_trip)),
            custom_predicate: predicate_overridden || self.custom_predicate,
            is_successful: partial.is_successful.unwrap_or_else(|| Arc::clone(&self.is_successful)),
            on_state_change: partial.on_state_change.or_else(|| self.on_state_change.clone()),
            adaptive_threshold: partial.adaptive_threshold.unwrap_or(self.adaptive_threshold),
            failure_rate_threshold: partial
                .failure_rate_threshold
                .unwrap_or(self.failure_rate_threshold),
            minimum_observations: partial.minimum_observations.unwrap_or(self.minimum_observations),
        }
    }
}

/// A record of optional overrides applied to a live breaker's settings via
/// [`crate::CircuitBreaker::update_settings`]. Unset fields keep their
/// current value.
pub struct PartialSettings<E> {
    /// See [`Settings::name`].
    pub name: Option<String>,
    /// See [`Settings::max_requests`].
    pub max_requests: Option<u32>,
    /// See [`Settings::interval`].
    pub interval: Option<Duration>,
    /// See [`Settings::timeout`].
    pub timeout: Option<Duration>,
    /// See [`Settings::ready_to_trip`].
    pub ready_to_trip: Option<Predicate>,
    /// See [`Settings::is_successful`].
    pub is_successful: Option<Classifier<E>>,
    /// See [`Settings::on_state_change`].
    pub on_state_change: Option<StateChangeCallback>,
    /// See [`Settings::adaptive_threshold`].
    pub adaptive_threshold: Option<bool>,
    /// See [`Settings::failure_rate_threshold`].
    pub failure_rate_threshold: Option<f64>,
    /// See [`Settings::minimum_observations`].
    pub minimum_observations: Option<u64>,
}

impl<E> Default for PartialSettings<E> {
    fn default() -> Self {
        Self {
            name: None,
            max_requests: None,
            interval: None,
            timeout: None,
            ready_to_trip: None,
            is_successful: None,
            on_state_change: None,
            adaptive_threshold: None,
            failure_rate_threshold: None,
            minimum_observations: None,
        }
    }
}

impl<E> PartialSettings<E> {
    /// An empty update: every field unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets [`Settings::max_requests`].
    #[must_use]
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = Some(max_requests);
        self
    }

    /// Sets [`Settings::interval`].
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Sets [`Settings::timeout`].
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets [`Settings::failure_rate_threshold`].
    #[must_use]
    pub fn failure_rate_threshold(mut self, failure_rate_threshold: f64) -> Self {
        self.failure_rate_threshold = Some(failure_rate_threshold);
        self
    }

    /// Sets [`Settings::minimum_observations`].
    #[must_use]
    pub fn minimum_observations(mut self, minimum_observations: u64) -> Self {
        self.minimum_observations = Some(minimum_observations);
        self
    }

    /// Sets [`Settings::adaptive_threshold`].
    #[must_use]
    pub fn adaptive_threshold(mut self, adaptive_threshold: bool) -> Self {
        self.adaptive_threshold = Some(adaptive_threshold);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_defaults_zero_max_requests_to_one() {
        let mut settings = Settings::<&str>::new("t").max_requests(0);
        settings.normalize(true).unwrap();
        assert_eq!(settings.max_requests, 1);
    }

    #[test]
    fn update_rejects_zero_max_requests() {
        let mut settings = Settings::<&str>::new("t").max_requests(0);
        let err = settings.normalize(false).unwrap_err();
        assert_eq!(err, SettingsError::MaxRequestsZero);
    }

    #[test]
    fn adaptive_zero_threshold_defaults_to_point_oh_five_in_both_modes() {
        let mut construct = Settings::<&str>::new("t").adaptive(0.0, 20);
        construct.normalize(true).unwrap();
        assert_eq!(construct.failure_rate_threshold, 0.05);

        let mut update = Settings::<&str>::new("t").adaptive(0.0, 20);
        update.normalize(false).unwrap();
        assert_eq!(update.failure_rate_threshold, 0.05);
    }

    #[test]
    fn adaptive_threshold_out_of_range_is_rejected() {
        let mut settings = Settings::<&str>::new("t").adaptive(1.5, 20);
        assert_eq!(
            settings.normalize(true).unwrap_err(),
            SettingsError::FailureRateThresholdOutOfRange
        );
    }

    #[test]
    fn custom_predicate_survives_normalize() {
        let custom: Predicate = Arc::new(|c: &crate::counts::Counts| c.requests > 100);
        let mut settings = Settings::<&str>::new("t").ready_to_trip(custom);
        settings.normalize(true).unwrap();
        assert!(settings.custom_predicate);
    }

    #[test]
    fn merged_with_keeps_unset_fields() {
        let base = Settings::<&str>::new("t").max_requests(3);
        let merged = base.merged_with(PartialSettings::new().timeout(Duration::from_secs(5)));
        assert_eq!(merged.max_requests, 3);
        assert_eq!(merged.timeout, Duration::from_secs(5));
    }
}
