use alloy_primitives::B256;
use ovm_primitives::errors::{CodecError, MerkleError};
use thiserror::Error;

/// Errors raised by a chain client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport failed before a response came back.
    #[error("network error: {0}")]
    Network(String),

    /// Node answered with a JSON-RPC error.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// Response or log did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Requested block range is inverted.
    #[error("invalid block range: {from}..={to}")]
    InvalidRange { from: u64, to: u64 },

    /// Client returned an event outside the requested range or of another kind.
    #[error("unexpected event at block {block}")]
    UnexpectedEvent { block: u64 },

    /// The address manager has no entry for a contract name.
    #[error("{0} is not registered in the address manager")]
    Unregistered(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("client: {0}")]
    Client(#[from] ClientError),

    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    #[error("merkle: {0}")]
    Merkle(#[from] MerkleError),

    #[error("abi decode: {0}")]
    AbiDecode(#[from] alloy_sol_types::Error),

    #[error("{count} live state batches cover element {index}")]
    AmbiguousBatch { index: u64, count: usize },

    #[error("batch {batch_index} root mismatch: header {expected}, computed {computed}")]
    BatchRootMismatch {
        batch_index: u64,
        expected: B256,
        computed: B256,
    },

    #[error("element {index} missing from batch calldata ({available} elements decoded)")]
    ElementMissing { index: u64, available: usize },

    #[error("transaction batch {batch_index} was not submitted by the sequencer")]
    NotSequencerBatch { batch_index: u64 },
}

impl LedgerError {
    /// Transport-level failures that may succeed on a later poll.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::Client(ClientError::Network(_) | ClientError::Rpc(_))
        )
    }
}
