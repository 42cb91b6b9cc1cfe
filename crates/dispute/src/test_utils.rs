use std::{collections::HashMap, sync::Arc};

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_sol_types::SolCall;
use ovm_ledger::{
    client::{MockBaseChainClient, MockRollupClient},
    contracts::IStateCommitmentChain,
    types::{ChainEvent, EventPayload},
    BaseChainLedger, BatchContracts, ClientError, RollupLedger, ScanSettings,
};
use ovm_mpt::{keccak, MptNode, StateAccount};
use ovm_primitives::{
    batch::ChainBatchHeader,
    codec::encode_uint,
    merkle::batch_merkle_proof,
    proof::{AccountStateProof, StateDiffProof, StorageStateProof},
    rlp::encode_storage_uint,
    transaction::TransactionChainElement,
};

pub(crate) const SCC: Address = Address::repeat_byte(0x5c);
pub(crate) const CTC: Address = Address::repeat_byte(0xc7);
pub(crate) const GAS_LIMIT: u64 = 9_000_000;

fn header(batch_index: u64, batch_root: B256, size: u64, prev: u64) -> ChainBatchHeader {
    ChainBatchHeader {
        batch_index,
        batch_root,
        batch_size: size,
        prev_total_elements: prev,
        extra_data: Bytes::new(),
    }
}

/// Batch events and their calldata, served through a [`MockBaseChainClient`].
#[derive(Default)]
pub(crate) struct BaseChainFixture {
    events: Vec<ChainEvent>,
    inputs: HashMap<B256, Bytes>,
    block: u64,
}

impl BaseChainFixture {
    fn next_tx(&mut self) -> (u64, B256) {
        self.block += 1;
        (self.block, B256::left_padding_from(&self.block.to_be_bytes()))
    }

    pub(crate) fn append_state_batch(&mut self, batch_index: u64, prev: u64, roots: Vec<B256>) {
        let (block, tx_hash) = self.next_tx();
        let (batch_root, _) = batch_merkle_proof(&roots, 0).unwrap();
        let size = roots.len() as u64;
        let call = IStateCommitmentChain::appendStateBatchCall {
            _batch: roots,
            _shouldStartAtElement: U256::from(prev),
        };
        self.inputs.insert(tx_hash, call.abi_encode().into());
        self.events.push(ChainEvent {
            block_number: block,
            tx_hash,
            log_index: 0,
            payload: EventPayload::StateBatchAppended(header(batch_index, batch_root, size, prev)),
        });
    }

    /// Appends a sequencer batch with a single context holding `txs`.
    pub(crate) fn append_sequencer_batch(
        &mut self,
        batch_index: u64,
        prev: u64,
        timestamp: u64,
        l1_block: u64,
        txs: &[Vec<u8>],
    ) {
        let (block, tx_hash) = self.next_tx();
        let push = |buf: &mut Vec<u8>, v: u64, w: usize| buf.extend(encode_uint(U256::from(v), w).unwrap());

        let mut calldata = vec![0xd0, 0xf8, 0x93, 0x44];
        push(&mut calldata, prev, 5);
        push(&mut calldata, txs.len() as u64, 3);
        push(&mut calldata, 1, 3);
        push(&mut calldata, txs.len() as u64, 3);
        push(&mut calldata, 0, 3);
        push(&mut calldata, timestamp, 5);
        push(&mut calldata, l1_block, 5);

        let mut leaves = Vec::new();
        for tx in txs {
            push(&mut calldata, tx.len() as u64, 3);
            calldata.extend_from_slice(tx);
            let element = TransactionChainElement {
                is_sequenced: true,
                queue_index: 0,
                timestamp,
                block_number: l1_block,
                tx_data: Bytes::copy_from_slice(tx),
            };
            leaves.push(element.leaf_hash().unwrap());
        }
        let (batch_root, _) = batch_merkle_proof(&leaves, 0).unwrap();

        self.inputs.insert(tx_hash, calldata.into());
        self.events.push(ChainEvent {
            block_number: block,
            tx_hash,
            log_index: 0,
            payload: EventPayload::TransactionBatchAppended(header(
                batch_index,
                batch_root,
                txs.len() as u64,
                prev,
            )),
        });
        self.events.push(ChainEvent {
            block_number: block,
            tx_hash,
            log_index: 1,
            payload: EventPayload::SequencerBatchAppended {
                starting_queue_index: 0,
                num_queue_elements: 0,
                total_elements: prev + txs.len() as u64,
            },
        });
    }

    pub(crate) fn into_ledger(self) -> BaseChainLedger<MockBaseChainClient> {
        let Self { events, inputs, block } = self;

        let mut client = MockBaseChainClient::new();
        client.expect_block_number().returning(move || Ok(block));
        client.expect_query_events().returning(move |filter, from, to| {
            Ok(events
                .iter()
                .filter(|e| e.payload.kind() == filter.kind)
                .filter(|e| (from..=to).contains(&e.block_number))
                .cloned()
                .collect())
        });
        client.expect_transaction_input().returning(move |hash| {
            inputs
                .get(&hash)
                .cloned()
                .ok_or_else(|| ClientError::Rpc("unknown transaction".to_owned()))
        });
        client
            .expect_max_transaction_gas_limit()
            .returning(|| Ok(U256::from(GAS_LIMIT)));

        let contracts = BatchContracts {
            state_commitment_chain: SCC,
            canonical_transaction_chain: CTC,
        };
        BaseChainLedger::new(Arc::new(client), contracts, ScanSettings::default())
    }
}

/// Rollup whose block `n` has state root `roots[n]`. Other blocks do not exist yet.
pub(crate) fn rollup_with_roots(roots: HashMap<u64, B256>) -> RollupLedger<MockRollupClient> {
    let mut client = MockRollupClient::new();
    client
        .expect_state_root_at()
        .returning(move |block| Ok(roots.get(&block).copied()));
    RollupLedger::new(Arc::new(client))
}

/// One account of a [`WorldState`].
#[derive(Debug, Clone)]
pub(crate) struct TestAccount {
    pub(crate) address: Address,
    pub(crate) nonce: u64,
    pub(crate) balance: U256,
    pub(crate) code_hash: B256,
    pub(crate) storage: Vec<(B256, U256)>,
}

impl TestAccount {
    pub(crate) fn new(address: Address, nonce: u64, storage: Vec<(B256, U256)>) -> Self {
        Self {
            address,
            nonce,
            balance: U256::from(nonce * 1_000),
            code_hash: ovm_mpt::KECCAK_EMPTY,
            storage,
        }
    }
}

/// Fully known state from which state diff proofs are cut.
#[derive(Debug, Clone, Default)]
pub(crate) struct WorldState {
    pub(crate) state: MptNode,
    pub(crate) storage: HashMap<Address, MptNode>,
    accounts: Vec<TestAccount>,
}

impl WorldState {
    pub(crate) fn new(accounts: Vec<TestAccount>) -> Self {
        let mut world = Self::default();
        for account in accounts {
            let mut storage = MptNode::default();
            for (key, value) in &account.storage {
                storage
                    .insert(keccak(key).as_slice(), encode_storage_uint(*value))
                    .unwrap();
            }
            let record = StateAccount {
                nonce: account.nonce,
                balance: account.balance,
                storage_root: storage.hash(),
                code_hash: account.code_hash,
            };
            world
                .state
                .insert_rlp(keccak(account.address).as_slice(), record)
                .unwrap();
            world.storage.insert(account.address, storage);
            world.accounts.push(account);
        }
        world
    }

    pub(crate) fn root(&self) -> B256 {
        self.state.hash()
    }

    /// Proof of every account, or of the accounts in `touched` when given.
    pub(crate) fn state_diff_proof(&self, touched: Option<&[Address]>) -> StateDiffProof {
        let proofs = self
            .accounts
            .iter()
            .filter(|a| touched.is_none_or(|t| t.contains(&a.address)))
            .map(|account| {
                let storage = &self.storage[&account.address];
                AccountStateProof {
                    address: account.address,
                    account_proof: self.state.prove(keccak(account.address).as_slice()).unwrap(),
                    balance: account.balance,
                    code_hash: account.code_hash,
                    nonce: U64::from(account.nonce),
                    storage_hash: storage.hash(),
                    storage_proof: account
                        .storage
                        .iter()
                        .map(|(key, value)| StorageStateProof {
                            key: *key,
                            value: *value,
                            proof: storage.prove(keccak(key).as_slice()).unwrap(),
                        })
                        .collect(),
                }
            })
            .collect();

        StateDiffProof {
            header: serde_json::Value::Null,
            account_state_proofs: Some(proofs),
        }
    }
}
