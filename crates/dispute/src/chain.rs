//! [`DisputeContracts`] over a base chain provider with a signing wallet.

use std::sync::Arc;

use alloy::{
    contract::{self, CallBuilder, CallDecoder},
    eips::BlockId,
    network::TransactionBuilder,
    providers::{DynProvider, Provider},
    rpc::types::TransactionRequest,
    transports::{RpcError, TransportError},
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{decode_revert_reason, Revert, SolError};
use async_trait::async_trait;
use ovm_ledger::{
    client::BaseChainClient,
    types::{EventFilter, EventKind, EventPayload},
    BaseChainLedger, EventCache, LedgerError, ScanSettings,
};
use ovm_mpt::StateAccount;
use ovm_primitives::{
    batch::{ChainBatchHeader, ChainInclusionProof, StateRootBatchProof},
    transaction::{OvmTransaction, TransactionBatchProof, TransactionChainElement},
};
use tracing::debug;

use crate::{
    contracts::{DisputeContracts, StateTransitioner},
    errors::ContractError,
};

mod abi {
    alloy::sol! {
        struct ChainBatchHeader {
            uint256 batchIndex;
            bytes32 batchRoot;
            uint256 batchSize;
            uint256 prevTotalElements;
            bytes extraData;
        }

        struct ChainInclusionProof {
            uint256 index;
            bytes32[] siblings;
        }

        struct Transaction {
            uint256 timestamp;
            uint256 blockNumber;
            uint8 l1QueueOrigin;
            address l1TxOrigin;
            address entrypoint;
            uint256 gasLimit;
            bytes data;
        }

        struct TransactionChainElement {
            bool isSequenced;
            uint256 queueIndex;
            uint256 timestamp;
            uint256 blockNumber;
            bytes txData;
        }

        struct Account {
            uint256 nonce;
            uint256 balance;
            bytes32 storageRoot;
            bytes32 codeHash;
            address ethAddress;
            bool isFresh;
        }

        #[sol(rpc)]
        interface IFraudVerifier {
            function getStateTransitioner(bytes32 _preStateRoot, bytes32 _txHash)
                external view returns (address _stateTransitioner);

            function initializeFraudVerification(
                bytes32 _preStateRoot,
                ChainBatchHeader _preStateRootBatchHeader,
                ChainInclusionProof _preStateRootProof,
                Transaction _transaction,
                TransactionChainElement _txChainElement,
                ChainBatchHeader _transactionBatchHeader,
                ChainInclusionProof _transactionProof
            ) external;

            function finalizeFraudVerification(
                bytes32 _preStateRoot,
                ChainBatchHeader _preStateRootBatchHeader,
                ChainInclusionProof _preStateRootProof,
                bytes32 _txHash,
                bytes32 _postStateRoot,
                ChainBatchHeader _postStateRootBatchHeader,
                ChainInclusionProof _postStateRootProof
            ) external;
        }

        #[sol(rpc)]
        interface IStateTransitioner {
            function phase() external view returns (uint8);
            function ovmStateManager() external view returns (address);

            function proveContractState(
                address _ovmContractAddress,
                address _ethContractAddress,
                bytes _stateTrieWitness
            ) external;
            function proveStorageSlot(address _ovmContractAddress, bytes32 _key, bytes _storageTrieWitness)
                external;
            function applyTransaction(Transaction _transaction) external;
            function commitContractState(address _ovmContractAddress, bytes _stateTrieWitness) external;
            function commitStorageSlot(address _ovmContractAddress, bytes32 _key, bytes _storageTrieWitness)
                external;
            function completeTransition() external;
        }

        #[sol(rpc)]
        interface IStateManager {
            function hasAccount(address _address) external view returns (bool);
            function hasContractStorage(address _contract, bytes32 _key) external view returns (bool);
            function getAccount(address _address) external view returns (Account);
            function getContractStorage(address _contract, bytes32 _key) external view returns (bytes32);
            function wasAccountChanged(address _address) external view returns (bool);
            function wasAccountCommitted(address _address) external view returns (bool);
            function wasContractStorageChanged(address _contract, bytes32 _key) external view returns (bool);
            function wasContractStorageCommitted(address _contract, bytes32 _key) external view returns (bool);
            function getTotalUncommittedAccounts() external view returns (uint256);
            function getTotalUncommittedContractStorage() external view returns (uint256);
        }
    }
}

impl From<&ChainBatchHeader> for abi::ChainBatchHeader {
    fn from(header: &ChainBatchHeader) -> Self {
        Self {
            batchIndex: U256::from(header.batch_index),
            batchRoot: header.batch_root,
            batchSize: U256::from(header.batch_size),
            prevTotalElements: U256::from(header.prev_total_elements),
            extraData: header.extra_data.clone(),
        }
    }
}

impl From<&ChainInclusionProof> for abi::ChainInclusionProof {
    fn from(proof: &ChainInclusionProof) -> Self {
        Self {
            index: U256::from(proof.index),
            siblings: proof.siblings.clone(),
        }
    }
}

impl From<&OvmTransaction> for abi::Transaction {
    fn from(tx: &OvmTransaction) -> Self {
        Self {
            timestamp: U256::from(tx.timestamp),
            blockNumber: U256::from(tx.block_number),
            l1QueueOrigin: tx.l1_queue_origin,
            l1TxOrigin: tx.l1_tx_origin,
            entrypoint: tx.entrypoint,
            gasLimit: tx.gas_limit,
            data: tx.data.clone(),
        }
    }
}

impl From<&TransactionChainElement> for abi::TransactionChainElement {
    fn from(element: &TransactionChainElement) -> Self {
        Self {
            isSequenced: element.is_sequenced,
            queueIndex: U256::from(element.queue_index),
            timestamp: U256::from(element.timestamp),
            blockNumber: U256::from(element.block_number),
            txData: element.tx_data.clone(),
        }
    }
}

impl From<contract::Error> for ContractError {
    fn from(err: contract::Error) -> Self {
        match err {
            contract::Error::TransportError(err) => err.into(),
            contract::Error::AbiError(err) => ContractError::Decode(err.to_string()),
            contract::Error::ZeroData(..) => ContractError::Decode(err.to_string()),
            other => ContractError::Rpc(other.to_string()),
        }
    }
}

impl From<TransportError> for ContractError {
    fn from(err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) => {
                if let Some(data) = payload.as_revert_data() {
                    return ContractError::Reverted {
                        reason: revert_from_data(&data),
                    };
                }
                revert_from_message(&payload.message)
                    .unwrap_or_else(|| ContractError::Rpc(payload.to_string()))
            }
            RpcError::Transport(kind) => ContractError::Transport(kind.to_string()),
            other => ContractError::Rpc(other.to_string()),
        }
    }
}

/// `Error(string)` yields the bare reason. Panics and custom errors keep the decoder's rendering.
fn revert_from_data(data: &[u8]) -> Option<String> {
    match Revert::abi_decode(data) {
        Ok(revert) => Some(revert.reason).filter(|reason| !reason.is_empty()),
        Err(_) => decode_revert_reason(data),
    }
}

/// Nodes without revert data only report reverts in the error message, either as
/// `execution reverted: <reason>` or as `VM Exception while processing transaction: revert
/// <reason>`.
fn revert_from_message(message: &str) -> Option<ContractError> {
    if message.contains("invalid opcode") {
        return Some(ContractError::Reverted {
            reason: Some(message.to_owned()),
        });
    }
    if !message.contains("revert") {
        return None;
    }
    let reason = message
        .split_once(':')
        .map(|(_, rest)| rest.trim())
        .filter(|rest| !rest.is_empty() && *rest != "revert")
        .map(str::to_owned);
    Some(ContractError::Reverted { reason })
}

fn ledger_error(err: LedgerError) -> ContractError {
    if err.is_transient() {
        ContractError::Transport(err.to_string())
    } else {
        ContractError::Decode(err.to_string())
    }
}

fn narrow(value: U256, what: &str) -> Result<u64, ContractError> {
    u64::try_from(value).map_err(|_| ContractError::Decode(format!("{what} does not fit u64")))
}

/// Gas limits of the writes the driver sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSettings {
    /// Code deployments and every transitioner write but `applyTransaction`.
    pub deploy_gas_limit: u64,
    pub run_gas_limit: u64,
}

/// Simulates `call`, sends it, and waits for the receipt.
///
/// A failed receipt is replayed at its block to recover the revert reason.
async fn submit<P, D>(call: CallBuilder<P, D>, sender: Address, gas: u64) -> Result<(), ContractError>
where
    P: Provider,
    D: CallDecoder,
{
    let call = call.from(sender).gas(gas);
    call.call_raw().await?;

    let pending = call.send().await?;
    let tx_hash = *pending.tx_hash();
    let receipt = pending
        .get_receipt()
        .await
        .map_err(|err| ContractError::Receipt(err.to_string()))?;
    if receipt.status() {
        debug!(%tx_hash, gas_used = receipt.gas_used, "transaction confirmed");
        return Ok(());
    }

    let replay = match receipt.block_number {
        Some(block) => call.block(BlockId::number(block)),
        None => call,
    };
    match replay.call_raw().await {
        Err(err) => Err(err.into()),
        Ok(_) => Err(ContractError::Reverted { reason: None }),
    }
}

/// `OVM_FraudVerifier` on the base chain.
#[derive(Debug)]
pub struct AlloyDisputeContracts<B> {
    provider: DynProvider,
    sender: Address,
    fraud_verifier: Address,
    gas: GasSettings,
    base: Arc<BaseChainLedger<B>>,
}

impl<B: BaseChainClient> AlloyDisputeContracts<B> {
    /// `provider` must carry a wallet for `sender`. Commit events are read through the client
    /// of `base`, with a cache per transitioner.
    pub fn new(
        provider: DynProvider,
        sender: Address,
        fraud_verifier: Address,
        gas: GasSettings,
        base: Arc<BaseChainLedger<B>>,
    ) -> Self {
        Self {
            provider,
            sender,
            fraud_verifier,
            gas,
            base,
        }
    }

    fn verifier(&self) -> abi::IFraudVerifier::IFraudVerifierInstance<&DynProvider> {
        abi::IFraudVerifier::new(self.fraud_verifier, &self.provider)
    }
}

#[async_trait]
impl<B: BaseChainClient> DisputeContracts for AlloyDisputeContracts<B> {
    type Transitioner = AlloyStateTransitioner<B>;

    async fn get_state_transitioner(
        &self,
        pre_state_root: B256,
        tx_hash: B256,
    ) -> Result<Address, ContractError> {
        Ok(self
            .verifier()
            .getStateTransitioner(pre_state_root, tx_hash)
            .call()
            .await?)
    }

    async fn initialize_fraud_verification(
        &self,
        pre_state: &StateRootBatchProof,
        transaction: &TransactionBatchProof,
    ) -> Result<(), ContractError> {
        let verifier = self.verifier();
        let call = verifier.initializeFraudVerification(
            pre_state.leaf_value,
            (&pre_state.batch_header).into(),
            (&pre_state.merkle_path).into(),
            (&transaction.transaction).into(),
            (&transaction.transaction_chain_element).into(),
            (&transaction.transaction_batch_header).into(),
            (&transaction.transaction_proof).into(),
        );
        submit(call, self.sender, self.gas.deploy_gas_limit).await
    }

    async fn finalize_fraud_verification(
        &self,
        pre_state: &StateRootBatchProof,
        tx_hash: B256,
        post_state: &StateRootBatchProof,
    ) -> Result<(), ContractError> {
        let verifier = self.verifier();
        let call = verifier.finalizeFraudVerification(
            pre_state.leaf_value,
            (&pre_state.batch_header).into(),
            (&pre_state.merkle_path).into(),
            tx_hash,
            post_state.leaf_value,
            (&post_state.batch_header).into(),
            (&post_state.merkle_path).into(),
        );
        submit(call, self.sender, self.gas.deploy_gas_limit).await
    }

    async fn transitioner(
        &self,
        address: Address,
        index: u64,
    ) -> Result<Self::Transitioner, ContractError> {
        let state_manager = abi::IStateTransitioner::new(address, &self.provider)
            .ovmStateManager()
            .call()
            .await?;

        let settings = *self.base.scan_settings();
        let start_block = self
            .base
            .get_dispute_inputs_block(index)
            .await
            .map_err(ledger_error)?
            .unwrap_or(settings.start_block);
        debug!(transitioner = %address, %start_block, "tracking commit events");

        Ok(AlloyStateTransitioner {
            address,
            state_manager,
            provider: self.provider.clone(),
            sender: self.sender,
            gas: self.gas,
            commits: CommitLog::new(
                self.base.client().clone(),
                address,
                ScanSettings {
                    start_block,
                    ..settings
                },
            ),
        })
    }

    async fn deploy_code(&self, init_code: Bytes) -> Result<Address, ContractError> {
        let tx = TransactionRequest::default()
            .from(self.sender)
            .with_deploy_code(init_code)
            .with_gas_limit(self.gas.deploy_gas_limit);
        let receipt = self
            .provider
            .send_transaction(tx)
            .await?
            .get_receipt()
            .await
            .map_err(|err| ContractError::Receipt(err.to_string()))?;
        if !receipt.status() {
            return Err(ContractError::Reverted { reason: None });
        }
        receipt
            .contract_address
            .ok_or_else(|| ContractError::Decode("deployment receipt has no contract address".to_owned()))
    }
}

/// Commit events of one transitioner, scanned from the block its dispute became possible.
///
/// Lives and dies with the transitioner handle.
#[derive(Debug)]
struct CommitLog<B> {
    client: Arc<B>,
    transitioner: Address,
    cache: EventCache,
}

impl<B: BaseChainClient> CommitLog<B> {
    fn new(client: Arc<B>, transitioner: Address, settings: ScanSettings) -> Self {
        Self {
            client,
            transitioner,
            cache: EventCache::new(settings),
        }
    }

    async fn payloads(&self, kind: EventKind) -> Result<Vec<EventPayload>, ContractError> {
        let filter = EventFilter::new(self.transitioner, kind);
        let events = self
            .cache
            .find_all_events(self.client.as_ref(), filter)
            .await
            .map_err(|err| ledger_error(err.into()))?;
        Ok(events.into_iter().map(|event| event.payload).collect())
    }
}

/// One `OVM_StateTransitioner` and its `OVM_StateManager`.
#[derive(Debug)]
pub struct AlloyStateTransitioner<B> {
    address: Address,
    state_manager: Address,
    provider: DynProvider,
    sender: Address,
    gas: GasSettings,
    commits: CommitLog<B>,
}

impl<B: BaseChainClient> AlloyStateTransitioner<B> {
    fn contract(&self) -> abi::IStateTransitioner::IStateTransitionerInstance<&DynProvider> {
        abi::IStateTransitioner::new(self.address, &self.provider)
    }

    fn manager(&self) -> abi::IStateManager::IStateManagerInstance<&DynProvider> {
        abi::IStateManager::new(self.state_manager, &self.provider)
    }
}

#[async_trait]
impl<B: BaseChainClient> StateTransitioner for AlloyStateTransitioner<B> {
    fn address(&self) -> Address {
        self.address
    }

    async fn phase(&self) -> Result<u8, ContractError> {
        Ok(self.contract().phase().call().await?)
    }

    async fn prove_contract_state(
        &self,
        ovm_address: Address,
        eth_address: Address,
        account_proof: Bytes,
    ) -> Result<(), ContractError> {
        let contract = self.contract();
        let call = contract.proveContractState(ovm_address, eth_address, account_proof);
        submit(call, self.sender, self.gas.deploy_gas_limit).await
    }

    async fn prove_storage_slot(
        &self,
        ovm_address: Address,
        key: B256,
        storage_proof: Bytes,
    ) -> Result<(), ContractError> {
        let contract = self.contract();
        let call = contract.proveStorageSlot(ovm_address, key, storage_proof);
        submit(call, self.sender, self.gas.deploy_gas_limit).await
    }

    async fn apply_transaction(&self, transaction: &OvmTransaction) -> Result<(), ContractError> {
        let contract = self.contract();
        let call = contract.applyTransaction(transaction.into());
        submit(call, self.sender, self.gas.run_gas_limit).await
    }

    async fn commit_contract_state(
        &self,
        ovm_address: Address,
        state_trie_proof: Bytes,
    ) -> Result<(), ContractError> {
        let contract = self.contract();
        let call = contract.commitContractState(ovm_address, state_trie_proof);
        submit(call, self.sender, self.gas.deploy_gas_limit).await
    }

    async fn commit_storage_slot(
        &self,
        ovm_address: Address,
        key: B256,
        storage_trie_proof: Bytes,
    ) -> Result<(), ContractError> {
        let contract = self.contract();
        let call = contract.commitStorageSlot(ovm_address, key, storage_trie_proof);
        submit(call, self.sender, self.gas.deploy_gas_limit).await
    }

    async fn complete_transition(&self) -> Result<(), ContractError> {
        let contract = self.contract();
        submit(contract.completeTransition(), self.sender, self.gas.deploy_gas_limit).await
    }

    async fn has_account(&self, address: Address) -> Result<bool, ContractError> {
        Ok(self.manager().hasAccount(address).call().await?)
    }

    async fn has_contract_storage(&self, address: Address, key: B256) -> Result<bool, ContractError> {
        Ok(self.manager().hasContractStorage(address, key).call().await?)
    }

    async fn get_account(&self, address: Address) -> Result<StateAccount, ContractError> {
        let account = self.manager().getAccount(address).call().await?;
        Ok(StateAccount {
            nonce: narrow(account.nonce, "account nonce")?,
            balance: account.balance,
            storage_root: account.storageRoot,
            code_hash: account.codeHash,
        })
    }

    async fn get_contract_storage(&self, address: Address, key: B256) -> Result<B256, ContractError> {
        Ok(self.manager().getContractStorage(address, key).call().await?)
    }

    async fn was_account_changed(&self, address: Address) -> Result<bool, ContractError> {
        Ok(self.manager().wasAccountChanged(address).call().await?)
    }

    async fn was_account_committed(&self, address: Address) -> Result<bool, ContractError> {
        Ok(self.manager().wasAccountCommitted(address).call().await?)
    }

    async fn was_contract_storage_changed(
        &self,
        address: Address,
        key: B256,
    ) -> Result<bool, ContractError> {
        Ok(self
            .manager()
            .wasContractStorageChanged(address, key)
            .call()
            .await?)
    }

    async fn was_contract_storage_committed(
        &self,
        address: Address,
        key: B256,
    ) -> Result<bool, ContractError> {
        Ok(self
            .manager()
            .wasContractStorageCommitted(address, key)
            .call()
            .await?)
    }

    async fn total_uncommitted_accounts(&self) -> Result<u64, ContractError> {
        let total = self.manager().getTotalUncommittedAccounts().call().await?;
        narrow(total, "uncommitted accounts")
    }

    async fn total_uncommitted_contract_storage(&self) -> Result<u64, ContractError> {
        let total = self
            .manager()
            .getTotalUncommittedContractStorage()
            .call()
            .await?;
        narrow(total, "uncommitted storage slots")
    }

    async fn account_committed_events(&self) -> Result<Vec<Address>, ContractError> {
        Ok(self
            .commits
            .payloads(EventKind::AccountCommitted)
            .await?
            .into_iter()
            .filter_map(|payload| match payload {
                EventPayload::AccountCommitted { address } => Some(address),
                _ => None,
            })
            .collect())
    }

    async fn storage_committed_events(&self) -> Result<Vec<(Address, B256)>, ContractError> {
        Ok(self
            .commits
            .payloads(EventKind::ContractStorageCommitted)
            .await?
            .into_iter()
            .filter_map(|payload| match payload {
                EventPayload::ContractStorageCommitted { address, key } => Some((address, key)),
                _ => None,
            })
            .collect())
    }
}
