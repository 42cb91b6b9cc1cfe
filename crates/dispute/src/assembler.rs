//! Gathers everything a dispute needs before the first write is sent.

use std::collections::HashMap;

use alloy_primitives::{Address, B256};
use ovm_ledger::{
    client::{BaseChainClient, RollupClient},
    BaseChainLedger, RollupLedger,
};
use ovm_mpt::MptNode;
use ovm_primitives::{
    batch::StateRootBatchProof,
    proof::{AccountStateProof, StateDiffProof},
    transaction::TransactionBatchProof,
};
use tracing::debug;

use crate::errors::DisputeError;

/// Proofs and sparse tries for one disputed state root.
///
/// Only the tries change once built. The driver folds committed post-state into them.
#[derive(Debug, Clone)]
pub struct FraudProofData {
    /// Global index of the disputed state root.
    pub index: u64,
    pub state_diff_proof: StateDiffProof,
    pub transaction_proof: TransactionBatchProof,
    pub pre_state_root_proof: StateRootBatchProof,
    pub post_state_root_proof: StateRootBatchProof,
    pub state_trie: MptNode,
    pub storage_tries: HashMap<Address, MptNode>,
    /// Rollup block the pre-state belongs to.
    pub pre_state_block: u64,
}

impl FraudProofData {
    /// Builds the sparse tries from `state_diff_proof` and checks them against the pre-state
    /// root when `verify_roots` is set.
    pub fn new(
        index: u64,
        state_diff_proof: StateDiffProof,
        transaction_proof: TransactionBatchProof,
        pre_state_root_proof: StateRootBatchProof,
        post_state_root_proof: StateRootBatchProof,
        pre_state_block: u64,
        verify_roots: bool,
    ) -> Result<Self, DisputeError> {
        let accounts = state_diff_proof
            .account_state_proofs
            .as_deref()
            .ok_or_else(|| DisputeError::MalformedProof("state diff has no accounts".to_owned()))?;

        let nodes: Vec<_> = accounts
            .iter()
            .flat_map(|account| account.account_proof.iter().cloned())
            .collect();
        let state_trie = if nodes.is_empty() {
            MptNode::from_digest(pre_state_root_proof.state_root())
        } else {
            MptNode::from_proof_nodes(&nodes)?
        };

        let mut storage_tries = HashMap::with_capacity(accounts.len());
        for account in accounts {
            storage_tries.insert(account.address, build_storage_trie(account)?);
        }

        if verify_roots {
            ensure_root("state trie", pre_state_root_proof.state_root(), &state_trie)?;
            for account in accounts {
                if account.storage_proof.is_empty() {
                    continue;
                }
                ensure_root(
                    &format!("storage trie of {}", account.address),
                    account.storage_hash,
                    &storage_tries[&account.address],
                )?;
            }
        }

        Ok(Self {
            index,
            state_diff_proof,
            transaction_proof,
            pre_state_root_proof,
            post_state_root_proof,
            state_trie,
            storage_tries,
            pre_state_block,
        })
    }

    /// Accounts touched by the disputed transaction, in the order the rollup reported them.
    pub fn accounts(&self) -> &[AccountStateProof] {
        self.state_diff_proof
            .account_state_proofs
            .as_deref()
            .unwrap_or_default()
    }
}

fn build_storage_trie(account: &AccountStateProof) -> Result<MptNode, DisputeError> {
    let nodes: Vec<_> = account
        .storage_proof
        .iter()
        .flat_map(|slot| slot.proof.iter().cloned())
        .collect();
    if nodes.is_empty() {
        return Ok(MptNode::from_digest(account.storage_hash));
    }
    Ok(MptNode::from_proof_nodes(&nodes)?)
}

fn ensure_root(what: &str, expected: B256, trie: &MptNode) -> Result<(), DisputeError> {
    let computed = trie.hash();
    if computed != expected {
        return Err(DisputeError::TrieRootMismatch {
            what: what.to_owned(),
            expected,
            computed,
        });
    }
    Ok(())
}

/// Collects the proofs for the divergent state root at `index`.
///
/// Fails with [`DisputeError::DataUnavailable`] while any piece is not published yet.
pub async fn assemble<B, R>(
    base: &BaseChainLedger<B>,
    rollup: &RollupLedger<R>,
    index: u64,
    l2_block_offset: u64,
    verify_roots: bool,
) -> Result<FraudProofData, DisputeError>
where
    B: BaseChainClient,
    R: RollupClient,
{
    let Some(pre_index) = index.checked_sub(1) else {
        return Err(DisputeError::NotDisputable { index });
    };

    let pre_state_root_proof = base
        .get_state_root_batch_proof(pre_index)
        .await?
        .ok_or(DisputeError::DataUnavailable("pre-state root proof"))?;
    let post_state_root_proof = base
        .get_state_root_batch_proof(index)
        .await?
        .ok_or(DisputeError::DataUnavailable("post-state root proof"))?;
    let transaction_proof = base
        .get_transaction_batch_proof(index)
        .await?
        .ok_or(DisputeError::DataUnavailable("transaction proof"))?;

    let block = index + l2_block_offset;
    let state_diff_proof = rollup.get_state_diff_proof(block).await?;
    debug!(
        %index,
        %block,
        accounts = state_diff_proof.account_state_proofs.as_ref().map(Vec::len),
        "fetched state diff proof"
    );

    FraudProofData::new(
        index,
        state_diff_proof,
        transaction_proof,
        pre_state_root_proof,
        post_state_root_proof,
        block - 1,
        verify_roots,
    )
}
