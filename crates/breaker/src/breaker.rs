//! The execute pipeline: admission, invocation, outcome recording, and the
//! runtime settings-update entry point.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::cancellation::Cancellable;
use crate::classifier::Outcome;
use crate::counts::{AtomicCounts, Counts};
use crate::error::{BreakerError, SettingsError};
use crate::observability::{self, Diagnostics, Metrics};
use crate::settings::{PartialSettings, Settings};
use crate::state::{State, StateWord};

/// Monotonic timestamp stored in a single `AtomicU64`, as nanoseconds
/// elapsed since a fixed epoch captured at breaker construction. Avoids
/// locking to publish `state_changed_at` alongside the lock-free state
/// word.
struct AtomicInstant {
    epoch: Instant,
    nanos: AtomicU64,
}

impl AtomicInstant {
    fn new(epoch: Instant) -> Self {
        Self { epoch, nanos: AtomicU64::new(0) }
    }

    fn store(&self, instant: Instant) {
        let elapsed = instant.saturating_duration_since(self.epoch).as_nanos();
        #[allow(clippy::cast_possible_truncation)]
        self.nanos.store(elapsed as u64, Ordering::Release);
    }

    fn load(&self) -> Instant {
        self.epoch + Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

/// Bookkeeping captured at admission time and consumed when the call
/// terminates.
struct Admission {
    generation: u64,
    half_open: bool,
}

/// A single shared circuit breaker, generic over the wrapped operation's
/// error type `E`.
///
/// All mutable state lives in atomics; the only lock is the `RwLock`
/// guarding the settings pointer, never held across a user operation.
pub struct CircuitBreaker<E> {
    settings: RwLock<Arc<Settings<E>>>,
    state: StateWord,
    counts: AtomicCounts,
    in_flight_half_open: AtomicU32,
    state_changed_at: AtomicInstant,
}

impl<E> CircuitBreaker<E>
where
    E: Send + Sync + 'static,
{
    /// Constructs a breaker from validated settings.
    ///
    /// # Panics
    /// Panics if `settings` fails validation. Construction-time invalid
    /// settings are a programmer error; use [`CircuitBreaker::try_new`] if
    /// you need a recoverable path (e.g. settings sourced from a config
    /// file at runtime).
    #[must_use]
    pub fn new(settings: Settings<E>) -> Self {
        match Self::try_new(settings) {
            Ok(breaker) => breaker,
            Err(err) => panic!("invalid circuit breaker settings: {err}"),
        }
    }

    /// Fallible counterpart to [`CircuitBreaker::new`].
    pub fn try_new(mut settings: Settings<E>) -> Result<Self, SettingsError> {
        settings.normalize(true)?;
        let now = Instant::now();
        Ok(Self {
            settings: RwLock::new(Arc::new(settings)),
            state: StateWord::new(State::Closed),
            counts: AtomicCounts::new(),
            in_flight_half_open: AtomicU32::new(0),
            state_changed_at: AtomicInstant::new(now),
        })
    }

    fn settings(&self) -> Arc<Settings<E>> {
        Arc::clone(&self.settings.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Breaker identifier, as set in its current settings.
    #[must_use]
    pub fn name(&self) -> String {
        self.settings().name.clone()
    }

    /// Current operating mode.
    #[must_use]
    pub fn state(&self) -> State {
        self.state.load().0
    }

    /// Current-generation counters.
    #[must_use]
    pub fn counts(&self) -> Counts {
        self.counts.snapshot()
    }

    /// Point-in-time metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> Metrics {
        let (state, _, _) = self.state.load();
        let counts = self.counts.snapshot();
        let state_changed_at = self.state_changed_at.load();
        Metrics {
            state,
            counts,
            failure_rate: counts.failure_rate(),
            success_rate: counts.success_rate(),
            state_changed_at,
            counts_cleared_at: state_changed_at,
        }
    }

    /// Point-in-time metrics plus the settings driving current behavior.
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        let settings = self.settings();
        let metrics = self.metrics();
        let will_trip_next = (settings.ready_to_trip_fn())(&metrics.counts.with_one_more_failure());
        let time_until_half_open = observability::time_until_half_open(
            metrics.state,
            settings.timeout,
            metrics.state_changed_at,
            Instant::now(),
        );
        Diagnostics {
            metrics,
            name: settings.name.clone(),
            adaptive_enabled: settings.adaptive_threshold,
            failure_rate_threshold: settings.failure_rate_threshold,
            minimum_observations: settings.minimum_observations,
            timeout: settings.timeout,
            max_requests: settings.max_requests,
            interval: settings.interval,
            will_trip_next,
            time_until_half_open,
        }
    }

    /// Runs `operation` under the breaker's admission control.
    ///
    /// A panic raised by `operation` is caught, recorded as a failure, and
    /// re-raised verbatim once bookkeeping completes.
    pub fn execute<F, T>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E> + panic::UnwindSafe,
    {
        let settings = self.settings();
        let admission = self.try_admit(&settings)?;

        match panic::catch_unwind(operation) {
            Ok(Ok(value)) => {
                self.record_outcome(&settings, &admission, Outcome::Success);
                Ok(value)
            }
            Ok(Err(err)) => {
                let outcome = (settings.is_successful)(&err);
                self.record_outcome(&settings, &admission, outcome);
                Err(BreakerError::Inner(err))
            }
            Err(panic_payload) => {
                self.record_outcome(&settings, &admission, Outcome::Failure);
                panic::resume_unwind(panic_payload);
            }
        }
    }

    /// As [`CircuitBreaker::execute`], but returns
    /// [`BreakerError::Cancelled`] without admitting if `cancellation`
    /// already fired. There is no suspension point to observe
    /// cancellation after admission; post-admission cancellation is
    /// whatever error `operation` itself returns.
    pub fn execute_with_cancellation<C, F, T>(
        &self,
        cancellation: &C,
        operation: F,
    ) -> Result<T, BreakerError<E>>
    where
        C: Cancellable,
        F: FnOnce() -> Result<T, E> + panic::UnwindSafe,
    {
        if cancellation.is_cancelled() {
            return Err(BreakerError::Cancelled);
        }
        self.execute(operation)
    }

    /// Validates and atomically publishes a partial settings update.
    /// In-flight calls admitted under the previous snapshot complete under
    /// the previous rules.
    pub fn update_settings(&self, partial: PartialSettings<E>) -> Result<(), SettingsError> {
        let current = self.settings();
        let mut candidate = current.merged_with(partial);
        candidate.normalize(false)?;

        let interval_changed = candidate.interval != current.interval;
        let timeout_changed = candidate.timeout != current.timeout;
        let candidate = Arc::new(candidate);

        {
            let mut guard = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            *guard = candidate;
        }

        if interval_changed {
            self.roll_generation();
        }
        if timeout_changed {
            let (state, _, _) = self.state.load();
            if state == State::Open {
                self.state_changed_at.store(Instant::now());
            }
        }

        Ok(())
    }

    fn roll_generation(&self) {
        let (state, generation, word) = self.state.load();
        if self.state.try_transition(word, state, generation + 1).is_ok() {
            self.counts.reset();
            self.state_changed_at.store(Instant::now());
        }
    }

    fn try_admit(&self, settings: &Settings<E>) -> Result<Admission, BreakerError<E>> {
        loop {
            let (state, generation, word) = self.state.load();
            match state {
                State::Closed => {
                    let roll_due = !settings.interval.is_zero()
                        && Instant::now().saturating_duration_since(self.state_changed_at.load())
                            >= settings.interval;
                    if roll_due {
                        if self.state.try_transition(word, State::Closed, generation + 1).is_ok() {
                            self.counts.reset();
                            self.state_changed_at.store(Instant::now());
                            tracing::debug!(name = %settings.name, "circuit breaker generation roll");
                        }
                        continue;
                    }
                    self.counts.on_admit();
                    return Ok(Admission { generation, half_open: false });
                }
                State::Open => {
                    let elapsed = Instant::now().saturating_duration_since(self.state_changed_at.load());
                    if elapsed >= settings.timeout {
                        if self.state.try_transition(word, State::HalfOpen, generation + 1).is_ok() {
                            self.counts.reset();
                            self.state_changed_at.store(Instant::now());
                            self.in_flight_half_open.store(0, Ordering::Release);
                            self.log_transition(&settings.name, State::Open, State::HalfOpen);
                            self.invoke_callback(settings, State::Open, State::HalfOpen);
                        }
                        continue;
                    }
                    return Err(BreakerError::OpenState);
                }
                State::HalfOpen => {
                    let in_flight = self.in_flight_half_open.fetch_add(1, Ordering::AcqRel) + 1;
                    if in_flight > settings.max_requests {
                        self.in_flight_half_open.fetch_sub(1, Ordering::AcqRel);
                        return Err(BreakerError::TooManyRequests);
                    }
                    self.counts.on_admit();
                    return Ok(Admission { generation, half_open: true });
                }
            }
        }
    }

    fn record_outcome(&self, settings: &Settings<E>, admission: &Admission, outcome: Outcome) {
        if admission.half_open {
            self.in_flight_half_open.fetch_sub(1, Ordering::AcqRel);
        }

        let (state, generation, word) = self.state.load();
        if generation != admission.generation {
            return;
        }

        match outcome {
            Outcome::Success => self.counts.on_success(),
            Outcome::Failure => self.counts.on_failure(),
        }
        let counts = self.counts.snapshot();

        match (state, outcome) {
            (State::Closed, _) => {
                if (settings.ready_to_trip_fn())(&counts) {
                    self.transition(settings, word, State::Closed, State::Open, generation + 1);
                }
            }
            (State::HalfOpen, Outcome::Failure) => {
                self.transition(settings, word, State::HalfOpen, State::Open, generation + 1);
            }
            (State::HalfOpen, Outcome::Success) => {
                self.transition(settings, word, State::HalfOpen, State::Closed, generation + 1);
            }
            (State::Open, _) => {}
        }
    }

    fn transition(&self, settings: &Settings<E>, current_word: u64, from: State, to: State, new_generation: u64) {
        if self.state.try_transition(current_word, to, new_generation).is_err() {
            return;
        }
        self.counts.reset();
        self.state_changed_at.store(Instant::now());
        if to == State::HalfOpen {
            self.in_flight_half_open.store(0, Ordering::Release);
        }
        self.log_transition(&settings.name, from, to);
        self.invoke_callback(settings, from, to);
    }

    fn log_transition(&self, name: &str, from: State, to: State) {
        if to == State::Open {
            tracing::warn!(name, from = %from, to = %to, "circuit breaker tripped");
        } else {
            tracing::info!(name, from = %from, to = %to, "circuit breaker transitioned");
        }
    }

    fn invoke_callback(&self, settings: &Settings<E>, from: State, to: State) {
        let Some(callback) = settings.on_state_change.as_ref() else {
            return;
        };
        let name = settings.name.clone();
        let callback = Arc::clone(callback);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(&name, from, to)));
        if outcome.is_err() {
            tracing::error!(name = %settings.name, "on_state_change observer panicked; contained");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn settings() -> Settings<&'static str> {
        Settings::new("test").ready_to_trip(crate::predicate::absolute())
    }

    #[test]
    fn successful_calls_stay_closed() {
        let breaker = CircuitBreaker::try_new(settings()).unwrap();
        for _ in 0..10 {
            assert!(breaker.execute(|| Ok::<_, &str>(())).is_ok());
        }
        assert_eq!(breaker.state(), State::Closed);
    }

    #[test]
    fn six_consecutive_failures_trip_to_open() {
        let breaker = CircuitBreaker::try_new(settings()).unwrap();
        for _ in 0..6 {
            let _ = breaker.execute(|| Err::<(), _>("boom"));
        }
        assert_eq!(breaker.state(), State::Open);
        assert_eq!(breaker.counts().requests, 0);
    }

    #[test]
    fn open_rejects_without_admitting() {
        let breaker = CircuitBreaker::try_new(settings()).unwrap();
        for _ in 0..6 {
            let _ = breaker.execute(|| Err::<(), _>("boom"));
        }
        let result = breaker.execute(|| Ok::<_, &str>(()));
        assert!(matches!(result, Err(BreakerError::OpenState)));
    }

    #[test]
    fn half_open_success_closes_the_circuit() {
        let breaker =
            CircuitBreaker::try_new(Settings::new("test").timeout(Duration::from_millis(10))).unwrap();
        for _ in 0..6 {
            let _ = breaker.execute(|| Err::<(), _>("boom"));
        }
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.execute(|| Ok::<_, &str>(())).is_ok());
        assert_eq!(breaker.state(), State::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let breaker =
            CircuitBreaker::try_new(Settings::new("test").timeout(Duration::from_millis(10))).unwrap();
        for _ in 0..6 {
            let _ = breaker.execute(|| Err::<(), _>("boom"));
        }
        std::thread::sleep(Duration::from_millis(20));
        let _ = breaker.execute(|| Err::<(), _>("boom again"));
        assert_eq!(breaker.state(), State::Open);
    }

    #[test]
    fn half_open_admission_cap_rejects_excess_probes() {
        let breaker = Arc::new(
            CircuitBreaker::try_new(
                Settings::new("test").timeout(Duration::from_millis(10)).max_requests(2),
            )
            .unwrap(),
        );
        for _ in 0..6 {
            let _ = breaker.execute(|| Err::<(), _>("boom"));
        }
        std::thread::sleep(Duration::from_millis(20));

        let admitted = Arc::new(AtomicUsize::new(0));
        let rejected = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let breaker = Arc::clone(&breaker);
            let admitted = Arc::clone(&admitted);
            let rejected = Arc::clone(&rejected);
            handles.push(std::thread::spawn(move || {
                let result = breaker.execute(|| {
                    std::thread::sleep(Duration::from_millis(50));
                    Ok::<_, &str>(())
                });
                match result {
                    Ok(()) => {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(BreakerError::TooManyRequests) => {
                        rejected.fetch_add(1, Ordering::SeqCst);
                    }
                    other => panic!("unexpected result: {other:?}"),
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 2);
        assert_eq!(rejected.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_is_recorded_as_failure_and_reraised() {
        let breaker = CircuitBreaker::try_new(
            Settings::new("test").ready_to_trip(crate::predicate::adaptive(0.5, 1)),
        )
        .unwrap();
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let _ = breaker.execute(|| -> Result<(), &str> { panic!("operation panicked") });
        }));
        assert!(result.is_err());
        assert_eq!(breaker.counts().total_failures, 1);
    }

    #[test]
    fn cancellation_token_blocks_admission() {
        let breaker = CircuitBreaker::try_new(settings()).unwrap();
        let token = crate::cancellation::CancellationToken::new();
        token.cancel();
        let result = breaker.execute_with_cancellation(&token, || Ok::<_, &str>(()));
        assert!(matches!(result, Err(BreakerError::Cancelled)));
        assert_eq!(breaker.counts().requests, 0);
    }

    #[test]
    fn update_settings_rejects_invalid_and_preserves_state() {
        let breaker = CircuitBreaker::try_new(Settings::new("test").adaptive(0.05, 20)).unwrap();
        let before = breaker.diagnostics().failure_rate_threshold;
        let err = breaker
            .update_settings(PartialSettings::new().failure_rate_threshold(1.5))
            .unwrap_err();
        assert_eq!(err, SettingsError::FailureRateThresholdOutOfRange);
        assert_eq!(breaker.diagnostics().failure_rate_threshold, before);
        assert!(breaker.execute(|| Ok::<_, &str>(())).is_ok());
    }

    #[test]
    fn changing_interval_clears_counts() {
        let breaker =
            CircuitBreaker::try_new(Settings::new("test").interval(Duration::from_secs(3600)))
                .unwrap();
        let _ = breaker.execute(|| Ok::<_, &str>(()));
        assert_eq!(breaker.counts().requests, 1);
        breaker
            .update_settings(PartialSettings::new().interval(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(breaker.counts().requests, 0);
    }
}
