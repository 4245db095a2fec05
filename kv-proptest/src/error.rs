//! Harness-internal error type, matching `kv_core::error`'s shape: a flat
//! `thiserror` enum, a `code()` tag, and a crate-local `Result` alias.

use thiserror::Error as ThisError;

use crate::runner::Violation;

#[derive(Debug, ThisError)]
pub enum Error {
    /// A confirmed invariant violation, surfaced as an error for callers
    /// that want to `?` a scenario run rather than inspect `TestReport` by
    /// hand.
    #[error("invariant {:?} violated at step {}: {}", .0.invariant, .0.step, .0.message)]
    InvariantViolation(Violation),

    /// Shrinking hit `max_attempts` before a full pass over every strategy
    /// made no further progress. The last failing `(ops, faults)` pair is
    /// still a valid reproducer -- it just isn't guaranteed minimal.
    #[error("shrinking stopped after {attempts} attempts without reaching a fixed point")]
    ShrinkBudgetExhausted { attempts: u32 },

    #[error(transparent)]
    Engine(#[from] kv_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvariantViolation(_) => "invariant_violation",
            Error::ShrinkBudgetExhausted { .. } => "shrink_budget_exhausted",
            Error::Engine(_) => "engine",
            Error::Io(_) => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable_per_variant() {
        let err = Error::ShrinkBudgetExhausted { attempts: 200 };
        assert_eq!(err.code(), "shrink_budget_exhausted");
    }
}
