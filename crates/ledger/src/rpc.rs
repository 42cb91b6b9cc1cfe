//! Chain clients backed by alloy providers.

use alloy::{
    consensus::Transaction as _,
    contract,
    providers::{DynProvider, Provider},
    rpc::types::{Filter, Log},
    transports::{RpcError, TransportError},
};
use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use ovm_primitives::{batch::ChainBatchHeader, proof::StateDiffProof};
use serde::Deserialize;
use tracing::debug;

use crate::{
    client::{BaseChainClient, RollupClient},
    contracts::{
        names, IAddressManager, ICanonicalTransactionChain, IExecutionManager,
        IStateCommitmentChain, IStateTransitionerEvents,
    },
    errors::ClientError,
    types::{ChainEvent, EventFilter, EventKind, EventPayload, RollupInfo},
};

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            RpcError::ErrorResp(payload) => ClientError::Rpc(payload.to_string()),
            RpcError::Transport(kind) => ClientError::Network(kind.to_string()),
            RpcError::DeserError { err, .. } => ClientError::Decode(err.to_string()),
            other => ClientError::Rpc(other.to_string()),
        }
    }
}

impl From<contract::Error> for ClientError {
    fn from(err: contract::Error) -> Self {
        match err {
            contract::Error::TransportError(err) => err.into(),
            other => ClientError::Decode(other.to_string()),
        }
    }
}

/// Addresses of the base chain contracts, as registered in the address manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractAddresses {
    pub state_commitment_chain: Address,
    pub canonical_transaction_chain: Address,
    pub fraud_verifier: Address,
    pub execution_manager: Address,
}

impl ContractAddresses {
    /// Looks every contract up in the address manager at `address_manager`.
    pub async fn resolve(
        provider: &DynProvider,
        address_manager: Address,
    ) -> Result<Self, ClientError> {
        let manager = IAddressManager::new(address_manager, provider);
        let lookup = |name: &'static str| {
            let call = manager.getAddress(name.to_owned());
            async move {
                let address = call.call().await?;
                if address.is_zero() {
                    return Err(ClientError::Unregistered(name.to_owned()));
                }
                debug!(%name, %address, "resolved contract");
                Ok(address)
            }
        };

        Ok(Self {
            state_commitment_chain: lookup(names::STATE_COMMITMENT_CHAIN).await?,
            canonical_transaction_chain: lookup(names::CANONICAL_TRANSACTION_CHAIN).await?,
            fraud_verifier: lookup(names::FRAUD_VERIFIER).await?,
            execution_manager: lookup(names::EXECUTION_MANAGER).await?,
        })
    }
}

/// [`BaseChainClient`] over a base chain JSON-RPC provider.
#[derive(Debug, Clone)]
pub struct AlloyBaseChainClient {
    provider: DynProvider,
    execution_manager: Address,
}

impl AlloyBaseChainClient {
    pub fn new(provider: DynProvider, execution_manager: Address) -> Self {
        Self {
            provider,
            execution_manager,
        }
    }

    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

#[async_trait]
impl BaseChainClient for AlloyBaseChainClient {
    async fn block_number(&self) -> Result<u64, ClientError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn query_events(
        &self,
        filter: EventFilter,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainEvent>, ClientError> {
        let query = Filter::new()
            .address(filter.address)
            .event_signature(signature_of(filter.kind))
            .from_block(from_block)
            .to_block(to_block);
        let logs = self.provider.get_logs(&query).await?;
        logs.iter().map(|log| decode_log(filter.kind, log)).collect()
    }

    async fn transaction_input(&self, tx_hash: B256) -> Result<Bytes, ClientError> {
        let tx = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await?
            .ok_or_else(|| ClientError::Rpc(format!("transaction {tx_hash} not found")))?;
        Ok(tx.input().clone())
    }

    async fn max_transaction_gas_limit(&self) -> Result<U256, ClientError> {
        let manager = IExecutionManager::new(self.execution_manager, &self.provider);
        Ok(manager.getMaxTransactionGasLimit().call().await?)
    }
}

fn signature_of(kind: EventKind) -> B256 {
    match kind {
        EventKind::StateBatchAppended => IStateCommitmentChain::StateBatchAppended::SIGNATURE_HASH,
        EventKind::StateBatchDeleted => IStateCommitmentChain::StateBatchDeleted::SIGNATURE_HASH,
        EventKind::TransactionBatchAppended => {
            ICanonicalTransactionChain::TransactionBatchAppended::SIGNATURE_HASH
        }
        EventKind::SequencerBatchAppended => {
            ICanonicalTransactionChain::SequencerBatchAppended::SIGNATURE_HASH
        }
        EventKind::AccountCommitted => IStateTransitionerEvents::AccountCommitted::SIGNATURE_HASH,
        EventKind::ContractStorageCommitted => {
            IStateTransitionerEvents::ContractStorageCommitted::SIGNATURE_HASH
        }
    }
}

fn decode_log(kind: EventKind, log: &Log) -> Result<ChainEvent, ClientError> {
    let block_number = log
        .block_number
        .ok_or_else(|| ClientError::Decode("log without block number".to_owned()))?;
    let tx_hash = log
        .transaction_hash
        .ok_or_else(|| ClientError::Decode("log without transaction hash".to_owned()))?;

    let payload = match kind {
        EventKind::StateBatchAppended => {
            let ev = decode_data::<IStateCommitmentChain::StateBatchAppended>(log)?;
            EventPayload::StateBatchAppended(ChainBatchHeader {
                batch_index: narrow(ev._batchIndex, "batchIndex")?,
                batch_root: ev._batchRoot,
                batch_size: narrow(ev._batchSize, "batchSize")?,
                prev_total_elements: narrow(ev._prevTotalElements, "prevTotalElements")?,
                extra_data: ev._extraData,
            })
        }
        EventKind::StateBatchDeleted => {
            let ev = decode_data::<IStateCommitmentChain::StateBatchDeleted>(log)?;
            EventPayload::StateBatchDeleted {
                batch_index: narrow(ev._batchIndex, "batchIndex")?,
                batch_root: ev._batchRoot,
            }
        }
        EventKind::TransactionBatchAppended => {
            let ev = decode_data::<ICanonicalTransactionChain::TransactionBatchAppended>(log)?;
            EventPayload::TransactionBatchAppended(ChainBatchHeader {
                batch_index: narrow(ev._batchIndex, "batchIndex")?,
                batch_root: ev._batchRoot,
                batch_size: narrow(ev._batchSize, "batchSize")?,
                prev_total_elements: narrow(ev._prevTotalElements, "prevTotalElements")?,
                extra_data: ev._extraData,
            })
        }
        EventKind::SequencerBatchAppended => {
            let ev = decode_data::<ICanonicalTransactionChain::SequencerBatchAppended>(log)?;
            EventPayload::SequencerBatchAppended {
                starting_queue_index: narrow(ev._startingQueueIndex, "startingQueueIndex")?,
                num_queue_elements: narrow(ev._numQueueElements, "numQueueElements")?,
                total_elements: narrow(ev._totalElements, "totalElements")?,
            }
        }
        EventKind::AccountCommitted => {
            let ev = decode_data::<IStateTransitionerEvents::AccountCommitted>(log)?;
            EventPayload::AccountCommitted {
                address: ev._address,
            }
        }
        EventKind::ContractStorageCommitted => {
            let ev = decode_data::<IStateTransitionerEvents::ContractStorageCommitted>(log)?;
            EventPayload::ContractStorageCommitted {
                address: ev._address,
                key: ev._key,
            }
        }
    };

    Ok(ChainEvent {
        block_number,
        tx_hash,
        log_index: log.log_index.unwrap_or_default(),
        payload,
    })
}

fn decode_data<E: SolEvent>(log: &Log) -> Result<E, ClientError> {
    log.log_decode::<E>()
        .map(|decoded| decoded.inner.data)
        .map_err(|err| ClientError::Decode(err.to_string()))
}

fn narrow(value: U256, field: &'static str) -> Result<u64, ClientError> {
    u64::try_from(value).map_err(|_| ClientError::Decode(format!("{field} does not fit u64")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockStateRoot {
    state_root: B256,
}

/// [`RollupClient`] over a rollup node's JSON-RPC endpoint.
///
/// Blocks are read through raw requests since rollup nodes return extra header fields
/// that the typed block response does not expect.
#[derive(Debug, Clone)]
pub struct AlloyRollupClient {
    provider: DynProvider,
}

impl AlloyRollupClient {
    pub fn new(provider: DynProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl RollupClient for AlloyRollupClient {
    async fn state_root_at(&self, block: u64) -> Result<Option<B256>, ClientError> {
        let block: Option<BlockStateRoot> = self
            .provider
            .raw_request("eth_getBlockByNumber".into(), (U64::from(block), false))
            .await?;
        Ok(block.map(|b| b.state_root))
    }

    async fn state_diff_proof(&self, block: u64) -> Result<StateDiffProof, ClientError> {
        Ok(self
            .provider
            .raw_request("eth_getStateDiffProof".into(), (U64::from(block),))
            .await?)
    }

    async fn code_at(&self, address: Address, block: u64) -> Result<Bytes, ClientError> {
        Ok(self
            .provider
            .get_code_at(address)
            .block_id(block.into())
            .await?)
    }

    async fn rollup_info(&self) -> Result<RollupInfo, ClientError> {
        Ok(self
            .provider
            .raw_request("rollup_getInfo".into(), [(); 0])
            .await?)
    }
}
