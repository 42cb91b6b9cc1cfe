use alloy_primitives::B256;
use ovm_ledger::LedgerError;
use ovm_primitives::{
    errors::{CodecError, PhaseError},
    phase::TransitionPhase,
};
use thiserror::Error;

use crate::contracts::Step;

/// Failure of a dispute contract call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// Execution reverted. `None` means the revert carried no reason.
    #[error("reverted: {}", .reason.as_deref().unwrap_or("<no reason>"))]
    Reverted { reason: Option<String> },

    /// Node rejected the request for a reason other than a revert.
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// Transaction was sent but its receipt never arrived.
    #[error("receipt error: {0}")]
    Receipt(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl ContractError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Receipt(_))
    }
}

/// Errors that abort one dispute cycle.
///
/// Recoverable errors mean the inputs were not ready or not reachable and the next poll
/// may succeed. The rest are protocol violations that need an operator to look at them.
#[derive(Debug, Error)]
pub enum DisputeError {
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("trie: {0}")]
    Trie(#[from] ovm_mpt::Error),

    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("phase: {0}")]
    Phase(#[from] PhaseError),

    /// A contract read failed.
    #[error("contract read: {0}")]
    Read(#[from] ContractError),

    /// A write reverted for a reason that is not a lost race, or could not be sent.
    #[error("{step} failed: {source}")]
    Contract {
        step: Step,
        #[source]
        source: ContractError,
    },

    #[error("{0} is not available yet")]
    DataUnavailable(&'static str),

    #[error("malformed proof: {0}")]
    MalformedProof(String),

    /// The first state root has no pre-state to dispute against.
    #[error("state root {index} cannot be disputed")]
    NotDisputable { index: u64 },

    #[error("{what} root mismatch: expected {expected}, rebuilt {computed}")]
    TrieRootMismatch {
        what: String,
        expected: B256,
        computed: B256,
    },

    /// The chain still reports uncommitted changes that the proof data has nothing for.
    #[error("{pending} changes left to commit but no proof data covers them")]
    MissingProofData { pending: u64 },

    #[error("no commit progress in {rounds} rounds, {pending} still pending")]
    CommitStalled { rounds: u32, pending: u64 },

    /// The transitioner reported the same phase after the driver finished it.
    #[error("transitioner did not leave phase {phase}")]
    PhaseNotAdvanced { phase: TransitionPhase },
}

impl DisputeError {
    /// Returns true if a later poll cycle may succeed without intervention.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Ledger(_)
            | Self::Trie(_)
            | Self::Codec(_)
            | Self::DataUnavailable(_)
            | Self::MalformedProof(_)
            | Self::TrieRootMismatch { .. } => true,

            Self::Read(err) | Self::Contract { source: err, .. } => err.is_transient(),

            Self::Phase(_)
            | Self::NotDisputable { .. }
            | Self::MissingProofData { .. }
            | Self::CommitStalled { .. }
            | Self::PhaseNotAdvanced { .. } => false,
        }
    }
}
