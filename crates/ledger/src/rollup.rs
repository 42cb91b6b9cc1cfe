//! Blocks and state proofs served by a rollup node.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256};
use ovm_primitives::proof::StateDiffProof;

use crate::{client::RollupClient, errors::LedgerError, types::RollupInfo};

/// Read-only view of the rollup chain. Indices are rollup block numbers.
#[derive(Debug)]
pub struct RollupLedger<R> {
    client: Arc<R>,
}

impl<R: RollupClient> RollupLedger<R> {
    pub fn new(client: Arc<R>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<R> {
        &self.client
    }

    /// State root after block `index`, or `None` if the node has not produced it yet.
    pub async fn get_state_root(&self, index: u64) -> Result<Option<B256>, LedgerError> {
        Ok(self.client.state_root_at(index).await?)
    }

    pub async fn get_state_diff_proof(&self, index: u64) -> Result<StateDiffProof, LedgerError> {
        Ok(self.client.state_diff_proof(index).await?)
    }

    pub async fn get_rollup_info(&self) -> Result<RollupInfo, LedgerError> {
        Ok(self.client.rollup_info().await?)
    }

    pub async fn code_at(&self, address: Address, index: u64) -> Result<Bytes, LedgerError> {
        Ok(self.client.code_at(address, index).await?)
    }
}
