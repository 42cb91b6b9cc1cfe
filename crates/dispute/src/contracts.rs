//! Interfaces of the on-chain dispute contracts and classification of their reverts.

use std::fmt;

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use ovm_mpt::StateAccount;
use ovm_primitives::{
    batch::StateRootBatchProof,
    transaction::{OvmTransaction, TransactionBatchProof},
};

use crate::errors::{ContractError, DisputeError};

const WRONG_PHASE: &str = "Function must be called during the correct phase.";
const ACCOUNT_ALREADY_PROVEN: &str = "Account state has already been proven";
const SLOT_ALREADY_PROVEN: &str = "Storage slot has already been proven.";
const INVALID_OPCODE: &str = "invalid opcode";
const STALE_PROOF: &str = "Invalid root hash";
const SLOT_ALREADY_COMMITTED: &str =
    "Storage slot value wasn't changed or has already been committed.";
const ACCOUNT_ALREADY_COMMITTED: &str =
    "Account state wasn't changed or has already been committed.";
const STALE_HEADER: &str = "Invalid batch header.";
const INDEX_OUT_OF_BOUNDS: &str = "Index out of bounds.";

/// A write the driver submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Initialize,
    ProveContractState,
    ProveStorageSlot,
    ApplyTransaction,
    CommitStorageSlot,
    CommitContractState,
    CompleteTransition,
    Finalize,
    /// Deployment of an account's code ahead of `proveContractState`.
    DeployCode,
}

impl Step {
    /// Revert messages that mean another prover already did this work.
    fn benign_markers(&self) -> &'static [&'static str] {
        match self {
            Self::Initialize | Self::ApplyTransaction | Self::CompleteTransition => &[WRONG_PHASE],
            Self::ProveContractState => &[WRONG_PHASE, ACCOUNT_ALREADY_PROVEN],
            Self::ProveStorageSlot => &[WRONG_PHASE, SLOT_ALREADY_PROVEN],
            Self::CommitStorageSlot => &[
                WRONG_PHASE,
                INVALID_OPCODE,
                STALE_PROOF,
                SLOT_ALREADY_COMMITTED,
            ],
            Self::CommitContractState => &[
                WRONG_PHASE,
                INVALID_OPCODE,
                STALE_PROOF,
                SLOT_ALREADY_COMMITTED,
                ACCOUNT_ALREADY_COMMITTED,
            ],
            Self::Finalize => &[STALE_HEADER, INDEX_OUT_OF_BOUNDS],
            Self::DeployCode => &[],
        }
    }

    /// Whether a revert with `reason` means this step lost a race rather than failed.
    ///
    /// `None` is a revert without a reason string, which every contract write but
    /// `applyTransaction` treats as already done.
    pub fn is_benign(&self, reason: Option<&str>) -> bool {
        match reason {
            None => !matches!(self, Self::ApplyTransaction | Self::DeployCode),
            Some(reason) => self
                .benign_markers()
                .iter()
                .any(|marker| reason.contains(marker)),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialize => "initializeFraudVerification",
            Self::ProveContractState => "proveContractState",
            Self::ProveStorageSlot => "proveStorageSlot",
            Self::ApplyTransaction => "applyTransaction",
            Self::CommitStorageSlot => "commitStorageSlot",
            Self::CommitContractState => "commitContractState",
            Self::CompleteTransition => "completeTransition",
            Self::Finalize => "finalizeFraudVerification",
            Self::DeployCode => "deployCode",
        };
        f.write_str(name)
    }
}

/// Result of a write that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Applied,
    /// Reverted because the chain was already past this step.
    LostRace { reason: Option<String> },
}

/// Maps the raw result of a `step` write to an outcome, absorbing benign reverts.
pub fn classify(step: Step, result: Result<(), ContractError>) -> Result<SubmitOutcome, DisputeError> {
    match result {
        Ok(()) => Ok(SubmitOutcome::Applied),
        Err(ContractError::Reverted { reason }) if step.is_benign(reason.as_deref()) => {
            Ok(SubmitOutcome::LostRace { reason })
        }
        Err(source) => Err(DisputeError::Contract { step, source }),
    }
}

/// `OVM_FraudVerifier` plus the ability to deploy code on the base chain.
#[cfg_attr(
    any(test, feature = "test-utils"),
    mockall::automock(type Transitioner = MockStateTransitioner;)
)]
#[async_trait]
pub trait DisputeContracts: Send + Sync + 'static {
    type Transitioner: StateTransitioner;

    /// Transitioner of the dispute `(pre_state_root, tx_hash)`, or the zero address.
    async fn get_state_transitioner(
        &self,
        pre_state_root: B256,
        tx_hash: B256,
    ) -> Result<Address, ContractError>;

    async fn initialize_fraud_verification(
        &self,
        pre_state: &StateRootBatchProof,
        transaction: &TransactionBatchProof,
    ) -> Result<(), ContractError>;

    async fn finalize_fraud_verification(
        &self,
        pre_state: &StateRootBatchProof,
        tx_hash: B256,
        post_state: &StateRootBatchProof,
    ) -> Result<(), ContractError>;

    /// Handle on the transitioner deployed at `address` for the dispute of state root `index`.
    async fn transitioner(
        &self,
        address: Address,
        index: u64,
    ) -> Result<Self::Transitioner, ContractError>;

    /// Deploys `init_code` and returns the address of the created contract.
    async fn deploy_code(&self, init_code: Bytes) -> Result<Address, ContractError>;
}

/// One `OVM_StateTransitioner` together with its `OVM_StateManager`.
#[cfg_attr(any(test, feature = "test-utils"), mockall::automock)]
#[async_trait]
pub trait StateTransitioner: Send + Sync + 'static {
    fn address(&self) -> Address;

    /// Raw `phase()` value.
    async fn phase(&self) -> Result<u8, ContractError>;

    async fn prove_contract_state(
        &self,
        ovm_address: Address,
        eth_address: Address,
        account_proof: Bytes,
    ) -> Result<(), ContractError>;

    async fn prove_storage_slot(
        &self,
        ovm_address: Address,
        key: B256,
        storage_proof: Bytes,
    ) -> Result<(), ContractError>;

    async fn apply_transaction(&self, transaction: &OvmTransaction) -> Result<(), ContractError>;

    async fn commit_contract_state(
        &self,
        ovm_address: Address,
        state_trie_proof: Bytes,
    ) -> Result<(), ContractError>;

    async fn commit_storage_slot(
        &self,
        ovm_address: Address,
        key: B256,
        storage_trie_proof: Bytes,
    ) -> Result<(), ContractError>;

    async fn complete_transition(&self) -> Result<(), ContractError>;

    async fn has_account(&self, address: Address) -> Result<bool, ContractError>;

    async fn has_contract_storage(&self, address: Address, key: B256) -> Result<bool, ContractError>;

    async fn get_account(&self, address: Address) -> Result<StateAccount, ContractError>;

    async fn get_contract_storage(&self, address: Address, key: B256) -> Result<B256, ContractError>;

    async fn was_account_changed(&self, address: Address) -> Result<bool, ContractError>;

    async fn was_account_committed(&self, address: Address) -> Result<bool, ContractError>;

    async fn was_contract_storage_changed(
        &self,
        address: Address,
        key: B256,
    ) -> Result<bool, ContractError>;

    async fn was_contract_storage_committed(
        &self,
        address: Address,
        key: B256,
    ) -> Result<bool, ContractError>;

    async fn total_uncommitted_accounts(&self) -> Result<u64, ContractError>;

    async fn total_uncommitted_contract_storage(&self) -> Result<u64, ContractError>;

    /// Addresses of every `AccountCommitted` event emitted so far.
    async fn account_committed_events(&self) -> Result<Vec<Address>, ContractError>;

    /// `(address, key)` of every `ContractStorageCommitted` event emitted so far.
    async fn storage_committed_events(&self) -> Result<Vec<(Address, B256)>, ContractError>;
}
