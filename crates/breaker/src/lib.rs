//! An adaptive circuit breaker: a concurrency primitive that wraps calls to
//! an unreliable downstream collaborator, tracks success/failure outcomes,
//! and transitions between three operating modes — Closed, Open, and
//! Half-Open — to fail fast when the collaborator is unhealthy and probe
//! for recovery afterwards.
//!
//! Its distinguishing feature over classic consecutive-failure breakers is
//! a percentage-based trip predicate ([`predicate::adaptive`]) that
//! behaves correctly across several orders of magnitude of traffic without
//! re-tuning.
//!
//! ```
//! use std::time::Duration;
//! use breaker::{CircuitBreaker, Settings};
//!
//! let breaker = CircuitBreaker::new(
//!     Settings::<&str>::new("downstream").adaptive(0.05, 20).timeout(Duration::from_secs(30)),
//! );
//!
//! match breaker.execute(|| Ok::<_, &str>("ok")) {
//!     Ok(value) => println!("succeeded: {value}"),
//!     Err(err) => println!("rejected or failed: {err}"),
//! }
//! ```
//!
//! # Thread safety
//! A single [`CircuitBreaker`] is designed to be shared across threads
//! (typically behind an `Arc`). All mutable state lives in atomics except
//! the settings snapshot pointer, which is never held across the wrapped
//! operation. There is no background task and no suspension point inside
//! the breaker itself.
//!
//! # Non-goals
//! Sliding-window counting, rate/concurrency limiting of the Closed path,
//! retry or backoff orchestration, persistent state across restarts,
//! multi-process coordination, and bulkheading are all out of scope; see
//! the crate's design notes for the rationale.

mod breaker;
mod cancellation;
mod classifier;
mod counts;
mod error;
mod observability;
mod predicate;
mod settings;
mod state;

pub use breaker::CircuitBreaker;
pub use cancellation::{Cancellable, CancellationToken};
pub use classifier::{default_classifier, Classifier, Outcome};
pub use counts::Counts;
pub use error::{BreakerError, SettingsError};
pub use observability::{Diagnostics, Metrics};
pub use predicate::{absolute, adaptive, Predicate};
pub use settings::{PartialSettings, Settings, StateChangeCallback};
pub use state::State;

#[cfg(feature = "serde")]
pub use observability::SettingsSnapshot;
