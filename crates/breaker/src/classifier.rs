//! Outcome classification: mapping a user operation's result to success/failure.

use std::sync::Arc;

/// The breaker's view of how a single admitted call terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// Counts toward `total_successes` / `consecutive_successes`.
    Success,
    /// Counts toward `total_failures` / `consecutive_failures` and is fed to
    /// the trip predicate.
    Failure,
}

/// A pure function from "did the operation report an error" to [`Outcome`].
///
/// Called only on the `Err` path of the wrapped operation; a successful
/// result is always `Outcome::Success` (spec note: there is no facility for
/// reclassifying a success value as a failure).
pub type Classifier<E> = Arc<dyn Fn(&E) -> Outcome + Send + Sync>;

/// The default classifier: any reported error is a failure.
#[must_use]
pub fn default_classifier<E>() -> Classifier<E>
where
    E: Send + Sync + 'static,
{
    Arc::new(|_err: &E| Outcome::Failure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_classifier_treats_every_error_as_failure() {
        let classifier = default_classifier::<&str>();
        assert_eq!(classifier(&"boom"), Outcome::Failure);
    }

    #[test]
    fn custom_classifier_may_downgrade_specific_errors_to_success() {
        let classifier: Classifier<i32> =
            Arc::new(|code: &i32| if *code == 404 { Outcome::Success } else { Outcome::Failure });
        assert_eq!(classifier(&404), Outcome::Success);
        assert_eq!(classifier(&500), Outcome::Failure);
    }
}
