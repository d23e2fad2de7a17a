//! Error taxonomy for the simulation core
//!
//! Capacity exhaustion is not an error (pools return `None`). Everything here
//! is either an invariant violation or a branch that should be unreachable;
//! the configured `ErrorPolicy` decides whether the caller panics or degrades.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::round::RoundState;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("handle {index}:{generation} does not reference a live slot")]
    StaleHandle { index: u32, generation: u32 },

    #[error("slot {index} freed twice")]
    DoubleFree { index: u32 },

    #[error("{what} is not alive")]
    NotAlive { what: &'static str },

    #[error("illegal round transition {from:?} -> {to:?}")]
    IllegalTransition { from: RoundState, to: RoundState },

    #[error("unreachable {what}: {detail}")]
    Unreachable { what: &'static str, detail: String },

    #[error("archive field `{key}` missing or malformed")]
    Archive { key: String },

    #[error("settings: {0}")]
    Settings(String),
}

impl SimError {
    pub fn unreachable(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Unreachable {
            what,
            detail: detail.into(),
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;

/// What to do with a `SimError` from a branch that should never be taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorPolicy {
    /// Panic on the first violation (tests, debug sessions)
    Strict,
    /// Log and continue with a fallback value (shipping builds)
    #[default]
    Lenient,
}

impl ErrorPolicy {
    /// Unwrap `result`, either panicking or substituting `fallback`
    pub fn settle<T>(self, result: SimResult<T>, fallback: T) -> T {
        match result {
            Ok(value) => value,
            Err(err) => match self {
                ErrorPolicy::Strict => panic!("simulation invariant violated: {err}"),
                ErrorPolicy::Lenient => {
                    log::warn!("ignoring simulation error: {err}");
                    fallback
                }
            },
        }
    }

    /// Like `settle` for operations with no value
    pub fn check(self, result: SimResult<()>) {
        self.settle(result, ());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_returns_fallback() {
        let result: SimResult<u32> = Err(SimError::unreachable("formation", "Spiral"));
        assert_eq!(ErrorPolicy::Lenient.settle(result, 7), 7);
    }

    #[test]
    #[should_panic(expected = "simulation invariant violated")]
    fn test_strict_panics() {
        ErrorPolicy::Strict.check(Err(SimError::DoubleFree { index: 3 }));
    }

    #[test]
    fn test_error_messages() {
        let err = SimError::IllegalTransition {
            from: RoundState::Idle,
            to: RoundState::PlayMaxiBoss,
        };
        assert_eq!(
            err.to_string(),
            "illegal round transition Idle -> PlayMaxiBoss"
        );
    }
}
