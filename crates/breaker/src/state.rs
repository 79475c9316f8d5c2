//! Circuit state and the packed `(state, generation)` atomic word.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operating mode of a [`crate::CircuitBreaker`].
///
/// Order is part of the observable interface: `Closed` sorts before `Open`
/// sorts before `HalfOpen`, which matters for gauges that export the
/// discriminant as a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum State {
    /// Normal operation. Calls pass through and outcomes are tracked.
    Closed = 0,
    /// The circuit is broken. Calls are rejected without reaching the
    /// wrapped operation.
    Open = 1,
    /// Probing. A limited number of calls are admitted to test recovery.
    HalfOpen = 2,
}

impl State {
    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => Self::Closed,
            1 => Self::Open,
            _ => Self::HalfOpen,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        })
    }
}

const STATE_BITS: u32 = 2;
const STATE_MASK: u64 = 0b11;

const fn pack(state: State, generation: u64) -> u64 {
    (generation << STATE_BITS) | (state as u64)
}

const fn unpack(word: u64) -> (State, u64) {
    (State::from_bits((word & STATE_MASK) as u8), word >> STATE_BITS)
}

/// Lock-free `(state, generation)` pair, updated with a single CAS.
///
/// At most one concurrent admission wins a given transition; the losers
/// observe the new word and retry from the top of the admission algorithm.
pub(crate) struct StateWord(AtomicU64);

impl StateWord {
    pub(crate) fn new(state: State) -> Self {
        Self(AtomicU64::new(pack(state, 0)))
    }

    /// Current `(state, generation)`, plus the raw word for a later CAS.
    pub(crate) fn load(&self) -> (State, u64, u64) {
        let word = self.0.load(Ordering::Acquire);
        let (state, generation) = unpack(word);
        (state, generation, word)
    }

    /// Attempt to move from `current_word` to `(new_state, new_generation)`.
    ///
    /// Returns `Ok(())` if this call won the race, `Err(())` if another
    /// thread already moved the word (caller should reload and retry).
    pub(crate) fn try_transition(
        &self,
        current_word: u64,
        new_state: State,
        new_generation: u64,
    ) -> Result<(), ()> {
        let new_word = pack(new_state, new_generation);
        self.0
            .compare_exchange(current_word, new_word, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_roundtrip() {
        for gen in [0_u64, 1, 2, 1_000_000] {
            for state in [State::Closed, State::Open, State::HalfOpen] {
                let word = pack(state, gen);
                assert_eq!(unpack(word), (state, gen));
            }
        }
    }

    #[test]
    fn display_matches_spec_strings() {
        assert_eq!(State::Closed.to_string(), "closed");
        assert_eq!(State::Open.to_string(), "open");
        assert_eq!(State::HalfOpen.to_string(), "half-open");
    }

    #[test]
    fn state_word_cas_loses_on_stale_word() {
        let word = StateWord::new(State::Closed);
        let (_, _, stale) = word.load();
        // Someone else moves it first.
        assert!(word.try_transition(stale, State::Open, 1).is_ok());
        // A second attempt from the same stale word must lose.
        assert!(word.try_transition(stale, State::HalfOpen, 2).is_err());
    }
}
