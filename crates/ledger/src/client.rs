//! Chain client interfaces the ledgers are built on.

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use ovm_primitives::proof::StateDiffProof;

use crate::{
    errors::ClientError,
    types::{ChainEvent, EventFilter, RollupInfo},
};

/// Read surface of a rollup full node.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait RollupClient: Send + Sync + 'static {
    /// State root of rollup block `block`, or `None` if the node does not have it yet.
    async fn state_root_at(&self, block: u64) -> Result<Option<B256>, ClientError>;

    /// Account and storage proofs for everything block `block` touched.
    async fn state_diff_proof(&self, block: u64) -> Result<StateDiffProof, ClientError>;

    /// Deployed code of `address` as of block `block`.
    async fn code_at(&self, address: Address, block: u64) -> Result<Bytes, ClientError>;

    async fn rollup_info(&self) -> Result<RollupInfo, ClientError>;
}

/// Read surface of the base chain the rollup publishes to.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait BaseChainClient: Send + Sync + 'static {
    async fn block_number(&self) -> Result<u64, ClientError>;

    /// Events matching `filter` in `from_block..=to_block`, in chain order.
    async fn query_events(
        &self,
        filter: EventFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainEvent>, ClientError>;

    /// Calldata of the transaction `tx_hash`.
    async fn transaction_input(&self, tx_hash: B256) -> Result<Bytes, ClientError>;

    /// `OVM_ExecutionManager.getMaxTransactionGasLimit()`.
    async fn max_transaction_gas_limit(&self) -> Result<U256, ClientError>;
}

/// [`BaseChainClient::query_events`] with the range and the returned events validated.
pub async fn query_events_checked(
    client: &impl BaseChainClient,
    filter: EventFilter,
    from_block: u64,
    to_block: u64,
) -> Result<Vec<ChainEvent>, ClientError> {
    if to_block < from_block {
        return Err(ClientError::InvalidRange {
            from: from_block,
            to: to_block,
        });
    }

    let events = client.query_events(filter, from_block, to_block).await?;
    if let Some(bad) = events.iter().find(|e| {
        e.block_number < from_block || e.block_number > to_block || e.payload.kind() != filter.kind
    }) {
        return Err(ClientError::UnexpectedEvent {
            block: bad.block_number,
        });
    }
    Ok(events)
}
