use alloy_primitives::B256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The walk reached a subtree that the supplied proofs only reference by hash.
    #[error("trie node {0} not resolved from proof")]
    NodeNotResolved(B256),

    #[error("invalid trie node: {0}")]
    InvalidNode(&'static str),

    #[error("rlp: {0}")]
    Rlp(#[from] alloy_rlp::Error),
}
