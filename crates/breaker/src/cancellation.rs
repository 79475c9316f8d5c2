//! Pre-admission cancellation, without pulling in an async runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Anything that can report "has cancellation already been requested".
///
/// The breaker only consults this before admission; there are no
/// suspension points inside `execute_with_cancellation` to check it again.
pub trait Cancellable {
    /// Returns `true` if cancellation has already been signaled.
    fn is_cancelled(&self) -> bool;
}

/// A simple, clonable, thread-safe cancellation flag.
///
/// Grounded on the same "shared flag" shape used for one-shot signaling
/// elsewhere in this codebase, minus any waker/notify machinery the core
/// has no use for since it never suspends.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl Cancellable for CancellationToken {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        assert!(!CancellationToken::new().is_cancelled());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
