//! Event and query types shared by the chain clients and the ledgers.

use alloy_primitives::{Address, B256};
use ovm_primitives::batch::ChainBatchHeader;
use serde::Deserialize;

/// Base chain events the prover reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateBatchAppended,
    StateBatchDeleted,
    TransactionBatchAppended,
    SequencerBatchAppended,
    AccountCommitted,
    ContractStorageCommitted,
}

impl EventKind {
    /// Batch events are only read once they are `finality` blocks deep. Commit events on a
    /// transitioner are read at the head, since the driver reacts to them immediately.
    pub fn requires_finality(&self) -> bool {
        matches!(
            self,
            Self::StateBatchAppended
                | Self::StateBatchDeleted
                | Self::TransactionBatchAppended
                | Self::SequencerBatchAppended
        )
    }
}

/// Event stream of one contract. Also the event cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventFilter {
    pub address: Address,
    pub kind: EventKind,
}

impl EventFilter {
    pub fn new(address: Address, kind: EventKind) -> Self {
        Self { address, kind }
    }
}

/// Decoded event body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    StateBatchAppended(ChainBatchHeader),
    StateBatchDeleted {
        batch_index: u64,
        batch_root: B256,
    },
    TransactionBatchAppended(ChainBatchHeader),
    SequencerBatchAppended {
        starting_queue_index: u64,
        num_queue_elements: u64,
        total_elements: u64,
    },
    AccountCommitted {
        address: Address,
    },
    ContractStorageCommitted {
        address: Address,
        key: B256,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateBatchAppended(_) => EventKind::StateBatchAppended,
            Self::StateBatchDeleted { .. } => EventKind::StateBatchDeleted,
            Self::TransactionBatchAppended(_) => EventKind::TransactionBatchAppended,
            Self::SequencerBatchAppended { .. } => EventKind::SequencerBatchAppended,
            Self::AccountCommitted { .. } => EventKind::AccountCommitted,
            Self::ContractStorageCommitted { .. } => EventKind::ContractStorageCommitted,
        }
    }

    /// Header carried by a batch-appended event.
    pub fn batch_header(&self) -> Option<&ChainBatchHeader> {
        match self {
            Self::StateBatchAppended(h) | Self::TransactionBatchAppended(h) => Some(h),
            _ => None,
        }
    }
}

/// One log emitted on the base chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
    pub payload: EventPayload,
}

/// Result of `rollup_getInfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RollupInfo {
    #[serde(default)]
    pub syncing: bool,
    #[serde(default)]
    pub addresses: RollupAddresses,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupAddresses {
    pub address_resolver: Option<Address>,
}
