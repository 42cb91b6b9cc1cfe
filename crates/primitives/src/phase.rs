use std::fmt;

use crate::errors::PhaseError;

/// Phase of an on-chain state transitioner.
///
/// Phases only move forward. Finalization is not a phase the transitioner reports; it is
/// observed through the fraud verifier instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransitionPhase {
    PreExecution,
    PostExecution,
    Complete,
}

impl TryFrom<u8> for TransitionPhase {
    type Error = PhaseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::PreExecution),
            1 => Ok(Self::PostExecution),
            2 => Ok(Self::Complete),
            other => Err(PhaseError::Unknown(other)),
        }
    }
}

impl From<TransitionPhase> for u8 {
    fn from(phase: TransitionPhase) -> Self {
        match phase {
            TransitionPhase::PreExecution => 0,
            TransitionPhase::PostExecution => 1,
            TransitionPhase::Complete => 2,
        }
    }
}

impl fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreExecution => "PRE_EXECUTION",
            Self::PostExecution => "POST_EXECUTION",
            Self::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}
