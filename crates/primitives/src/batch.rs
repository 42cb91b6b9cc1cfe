//! Batch headers and inclusion proofs.

use alloy_primitives::{Bytes, B256};

/// Header of an append-only batch of state roots or transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBatchHeader {
    pub batch_index: u64,
    pub batch_root: B256,
    pub batch_size: u64,
    pub prev_total_elements: u64,
    pub extra_data: Bytes,
}

impl ChainBatchHeader {
    /// Whether the global element `index` falls inside this batch.
    pub fn contains(&self, index: u64) -> bool {
        self.prev_total_elements <= index && index < self.end()
    }

    /// Global index one past the last element of the batch.
    pub fn end(&self) -> u64 {
        self.prev_total_elements.saturating_add(self.batch_size)
    }

    /// Position of global element `index` within the batch, if it is inside it.
    pub fn position_of(&self, index: u64) -> Option<usize> {
        self.contains(index)
            .then(|| (index - self.prev_total_elements) as usize)
    }
}

/// State root batches and transaction batches share the same header shape.
pub type StateRootBatchHeader = ChainBatchHeader;
pub type TransactionBatchHeader = ChainBatchHeader;

/// Sibling path of one leaf in a batch merkle tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainInclusionProof {
    pub index: u64,
    pub siblings: Vec<B256>,
}

/// Proves that `leaf_value` is an element of the batch described by `batch_header`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInclusionProof {
    pub leaf_value: B256,
    pub batch_header: ChainBatchHeader,
    pub merkle_path: ChainInclusionProof,
}

/// Inclusion proof whose leaf is a published state root.
pub type StateRootBatchProof = BatchInclusionProof;

impl BatchInclusionProof {
    pub fn state_root(&self) -> B256 {
        self.leaf_value
    }
}
