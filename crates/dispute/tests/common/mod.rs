#![allow(unreachable_pub, reason = "shared by the integration test binaries")]
#![allow(dead_code, reason = "not every test binary uses every helper")]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_rlp::Decodable;
use async_trait::async_trait;
use ovm_dispute::{
    driver::EMPTY_CODE_ADDRESS, ContractError, DisputeContracts, FraudProofData,
    StateTransitioner,
};
use ovm_ledger::{client::MockRollupClient, RollupLedger};
use ovm_mpt::{keccak, MptNode, StateAccount, KECCAK_EMPTY};
use ovm_primitives::{
    batch::{BatchInclusionProof, ChainBatchHeader, ChainInclusionProof, StateRootBatchProof},
    proof::{AccountStateProof, StateDiffProof, StorageStateProof},
    rlp::{encode_storage_uint, encode_storage_value},
    transaction::{OvmTransaction, TransactionBatchProof, TransactionChainElement},
};

pub const WRONG_PHASE: &str = "Function must be called during the correct phase.";

const PRE_EXECUTION: u8 = 0;
const POST_EXECUTION: u8 = 1;
pub const COMPLETE: u8 = 2;

/// Code served by the mock rollup for every address that has some.
pub const ACCOUNT_CODE: [u8; 3] = [0x60, 0x00, 0x56];

#[derive(Debug, Clone)]
pub struct TestAccount {
    pub address: Address,
    pub nonce: u64,
    pub balance: U256,
    pub code_hash: B256,
    pub storage: Vec<(B256, U256)>,
}

impl TestAccount {
    pub fn new(address: Address, nonce: u64, storage: Vec<(B256, U256)>) -> Self {
        Self {
            address,
            nonce,
            balance: U256::from(nonce * 1_000),
            code_hash: KECCAK_EMPTY,
            storage,
        }
    }

    pub fn with_code(mut self) -> Self {
        self.code_hash = keccak(ACCOUNT_CODE);
        self
    }
}

/// Fully known state from which state diff proofs are cut.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    pub state: MptNode,
    pub storage: HashMap<Address, MptNode>,
    pub accounts: Vec<TestAccount>,
}

impl WorldState {
    pub fn new(accounts: Vec<TestAccount>) -> Self {
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

    pub fn root(&self) -> B256 {
        self.state.hash()
    }

    /// State after applying `effects`, the way the transaction would.
    pub fn apply(&self, effects: &[Effect]) -> WorldState {
        let mut accounts = self.accounts.clone();
        for effect in effects {
            let account = accounts
                .iter_mut()
                .find(|a| a.address == effect.address())
                .unwrap();
            match effect {
                Effect::Storage { key, value, .. } => {
                    let slot = account.storage.iter_mut().find(|(k, _)| k == key).unwrap();
                    slot.1 = *value;
                }
                Effect::Nonce { .. } => account.nonce += 1,
            }
        }
        WorldState::new(accounts)
    }

    pub fn state_diff_proof(&self) -> StateDiffProof {
        let proofs = self
            .accounts
            .iter()
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

/// A state change the disputed transaction makes when applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Storage {
        address: Address,
        key: B256,
        value: U256,
    },
    Nonce {
        address: Address,
    },
}

impl Effect {
    pub fn address(&self) -> Address {
        match self {
            Self::Storage { address, .. } | Self::Nonce { address } => *address,
        }
    }
}

fn root_proof(root: B256, batch_index: u64) -> StateRootBatchProof {
    BatchInclusionProof {
        leaf_value: root,
        batch_header: ChainBatchHeader {
            batch_index,
            batch_root: root,
            batch_size: 1,
            prev_total_elements: batch_index,
            extra_data: Bytes::new(),
        },
        merkle_path: ChainInclusionProof::default(),
    }
}

/// Proof data for disputing the transition from `pre` to a bogus post-state root.
pub fn fraud_proof_data(pre: &WorldState) -> FraudProofData {
    let element = TransactionChainElement {
        is_sequenced: true,
        queue_index: 0,
        timestamp: 1_600_000_000,
        block_number: 11,
        tx_data: Bytes::from_static(b"\xde\xad\xbe\xef"),
    };
    let transaction_proof = TransactionBatchProof {
        transaction: element.to_sequenced_transaction(U256::from(9_000_000)),
        transaction_chain_element: element,
        transaction_batch_header: root_proof(B256::repeat_byte(0x7b), 4).batch_header,
        transaction_proof: ChainInclusionProof::default(),
    };
    FraudProofData::new(
        5,
        pre.state_diff_proof(),
        transaction_proof,
        root_proof(pre.root(), 4),
        root_proof(B256::repeat_byte(0xba), 5),
        5,
        true,
    )
    .unwrap()
}

/// Rollup that serves [`ACCOUNT_CODE`] for the accounts of `world` that have code.
pub fn rollup_for(world: &WorldState) -> Arc<RollupLedger<MockRollupClient>> {
    let with_code: Vec<Address> = world
        .accounts
        .iter()
        .filter(|a| a.code_hash != KECCAK_EMPTY)
        .map(|a| a.address)
        .collect();
    let mut client = MockRollupClient::new();
    client.expect_code_at().returning(move |address, _| {
        Ok(if with_code.contains(&address) {
            Bytes::from_static(&ACCOUNT_CODE)
        } else {
            Bytes::new()
        })
    });
    Arc::new(RollupLedger::new(Arc::new(client)))
}

fn revert<T>(reason: &str) -> Result<T, ContractError> {
    Err(ContractError::Reverted {
        reason: Some(reason.to_owned()),
    })
}

fn decode_witness(witness: &Bytes) -> Result<MptNode, ContractError> {
    let nodes = Vec::<Bytes>::decode(&mut witness.as_ref())
        .map_err(|err| ContractError::Decode(err.to_string()))?;
    MptNode::from_proof_nodes(&nodes).map_err(|err| ContractError::Decode(err.to_string()))
}

#[derive(Debug, Clone)]
struct SimAccount {
    record: StateAccount,
    eth_address: Address,
    changed: bool,
    committed: bool,
}

#[derive(Debug, Clone)]
struct SimSlot {
    value: B256,
    changed: bool,
    committed: bool,
}

/// One transitioner with its state manager.
#[derive(Debug, Clone)]
pub struct Game {
    pub address: Address,
    pub phase: u8,
    pub pre_state_root: B256,
    pub state_root: B256,
    accounts: HashMap<Address, SimAccount>,
    slots: HashMap<(Address, B256), SimSlot>,
    account_events: Vec<Address>,
    storage_events: Vec<(Address, B256)>,
}

impl Game {
    fn uncommitted_accounts(&self) -> u64 {
        self.accounts.values().filter(|a| a.changed && !a.committed).count() as u64
    }

    fn uncommitted_storage(&self) -> u64 {
        self.slots.values().filter(|s| s.changed && !s.committed).count() as u64
    }

    /// `(ovm address, eth address)` of every proven account.
    pub fn proven_accounts(&self) -> Vec<(Address, Address)> {
        self.accounts
            .iter()
            .map(|(address, account)| (*address, account.eth_address))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct SimState {
    /// What `applyTransaction` does to the proven state.
    pub effects: Vec<Effect>,
    pub games: HashMap<(B256, B256), Game>,
    pub finalized: Vec<(B256, B256)>,
    pub deployed: Vec<Bytes>,
    /// Every write that went through, in order.
    pub writes: Vec<&'static str>,
    /// Writes the transitioner rejected, with the error the sender saw.
    pub reverts: Vec<(&'static str, ContractError)>,
    pub init_calls: usize,
}

impl SimState {
    fn game_at(&mut self, address: Address) -> Result<&mut Game, ContractError> {
        self.games
            .values_mut()
            .find(|g| g.address == address)
            .ok_or_else(|| ContractError::Rpc(format!("no transitioner at {address}")))
    }
}

/// In-memory `OVM_FraudVerifier` and state transitioners following the on-chain rules.
///
/// Every write yields to the scheduler first so concurrent drivers interleave.
#[derive(Debug, Clone, Default)]
pub struct SimChain {
    state: Arc<Mutex<SimState>>,
}

impl SimChain {
    pub fn new(effects: Vec<Effect>) -> Self {
        let chain = Self::default();
        chain.lock().effects = effects;
        chain
    }

    pub fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    pub fn only_game(&self) -> Game {
        let state = self.lock();
        assert_eq!(state.games.len(), 1);
        state.games.values().next().cloned().unwrap()
    }

    /// Runs `f` on the game at `address` as a competing prover would.
    pub fn with_game<T>(&self, address: Address, f: impl FnOnce(&mut Game) -> T) -> T {
        let mut state = self.lock();
        let game = state.game_at(address).unwrap();
        f(game)
    }

    /// Plays `data`'s pre-execution phase out of band, leaving the game in post-execution.
    pub fn run_pre_execution(&self, address: Address, data: &FraudProofData) {
        let mut state = self.lock();
        let effects = state.effects.clone();
        let game = state.game_at(address).unwrap();
        for account in data.accounts() {
            game.accounts.insert(
                account.address,
                SimAccount {
                    record: StateAccount {
                        nonce: account.nonce.to::<u64>(),
                        balance: account.balance,
                        storage_root: account.storage_hash,
                        code_hash: account.code_hash,
                    },
                    eth_address: EMPTY_CODE_ADDRESS,
                    changed: false,
                    committed: false,
                },
            );
            for slot in &account.storage_proof {
                game.slots.insert(
                    (account.address, slot.key),
                    SimSlot {
                        value: B256::from(slot.value),
                        changed: false,
                        committed: false,
                    },
                );
            }
        }
        apply_effects(game, &effects).unwrap();
    }
}

fn apply_effects(game: &mut Game, effects: &[Effect]) -> Result<(), ContractError> {
    for effect in effects {
        let account = game
            .accounts
            .get_mut(&effect.address())
            .ok_or(ContractError::Reverted { reason: None })?;
        account.changed = true;
        match effect {
            Effect::Storage { address, key, value } => {
                let slot = game
                    .slots
                    .get_mut(&(*address, *key))
                    .ok_or(ContractError::Reverted { reason: None })?;
                slot.value = B256::from(*value);
                slot.changed = true;
            }
            Effect::Nonce { .. } => account.record.nonce += 1,
        }
    }
    game.phase = POST_EXECUTION;
    Ok(())
}

#[async_trait]
impl DisputeContracts for SimChain {
    type Transitioner = SimTransitioner;

    async fn get_state_transitioner(
        &self,
        pre_state_root: B256,
        tx_hash: B256,
    ) -> Result<Address, ContractError> {
        Ok(self
            .lock()
            .games
            .get(&(pre_state_root, tx_hash))
            .map(|g| g.address)
            .unwrap_or_default())
    }

    async fn initialize_fraud_verification(
        &self,
        pre_state: &StateRootBatchProof,
        transaction: &TransactionBatchProof,
    ) -> Result<(), ContractError> {
        tokio::task::yield_now().await;
        let tx_hash = transaction
            .transaction
            .hash()
            .map_err(|err| ContractError::Decode(err.to_string()))?;
        let mut state = self.lock();
        state.init_calls += 1;

        let key = (pre_state.leaf_value, tx_hash);
        if state.games.contains_key(&key) {
            return Ok(());
        }
        let address = Address::from_word(keccak(
            [pre_state.leaf_value.as_slice(), tx_hash.as_slice()].concat(),
        ));
        state.games.insert(
            key,
            Game {
                address,
                phase: PRE_EXECUTION,
                pre_state_root: pre_state.leaf_value,
                state_root: pre_state.leaf_value,
                accounts: HashMap::new(),
                slots: HashMap::new(),
                account_events: Vec::new(),
                storage_events: Vec::new(),
            },
        );
        state.writes.push("initializeFraudVerification");
        Ok(())
    }

    async fn finalize_fraud_verification(
        &self,
        pre_state: &StateRootBatchProof,
        tx_hash: B256,
        _post_state: &StateRootBatchProof,
    ) -> Result<(), ContractError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        let key = (pre_state.leaf_value, tx_hash);
        if state.finalized.contains(&key) {
            return revert("Invalid batch header.");
        }
        match state.games.get(&key) {
            Some(game) if game.phase == COMPLETE => {}
            _ => return revert("State transition process must be completed prior to finalization."),
        }
        state.finalized.push(key);
        state.writes.push("finalizeFraudVerification");
        Ok(())
    }

    async fn transitioner(
        &self,
        address: Address,
        _index: u64,
    ) -> Result<SimTransitioner, ContractError> {
        self.lock().game_at(address)?;
        Ok(SimTransitioner {
            address,
            chain: self.clone(),
        })
    }

    async fn deploy_code(&self, init_code: Bytes) -> Result<Address, ContractError> {
        tokio::task::yield_now().await;
        let mut state = self.lock();
        state.deployed.push(init_code.clone());
        state.writes.push("deployCode");
        Ok(Address::from_word(keccak(&init_code)))
    }
}

#[derive(Debug)]
pub struct SimTransitioner {
    address: Address,
    chain: SimChain,
}

impl SimTransitioner {
    fn read<T>(&self, f: impl FnOnce(&Game) -> T) -> Result<T, ContractError> {
        let mut state = self.chain.lock();
        Ok(f(state.game_at(self.address)?))
    }

    async fn write(
        &self,
        name: &'static str,
        phase: u8,
        f: impl FnOnce(&mut Game, &[Effect]) -> Result<(), ContractError>,
    ) -> Result<(), ContractError> {
        tokio::task::yield_now().await;
        let mut state = self.chain.lock();
        let effects = state.effects.clone();
        let result = state.game_at(self.address).and_then(|game| {
            if game.phase != phase {
                return revert(WRONG_PHASE);
            }
            f(game, &effects)
        });
        match &result {
            Ok(()) => state.writes.push(name),
            Err(err) => state.reverts.push((name, err.clone())),
        }
        result
    }
}

#[async_trait]
impl StateTransitioner for SimTransitioner {
    fn address(&self) -> Address {
        self.address
    }

    async fn phase(&self) -> Result<u8, ContractError> {
        self.read(|g| g.phase)
    }

    async fn prove_contract_state(
        &self,
        ovm_address: Address,
        eth_address: Address,
        account_proof: Bytes,
    ) -> Result<(), ContractError> {
        self.write("proveContractState", PRE_EXECUTION, |game, _| {
            if game.accounts.contains_key(&ovm_address) {
                return revert("Account state has already been proven");
            }
            let trie = decode_witness(&account_proof)?;
            if trie.hash() != game.pre_state_root {
                return revert("Invalid root hash");
            }
            let record: StateAccount = trie
                .get_rlp(keccak(ovm_address).as_slice())
                .map_err(|err| ContractError::Decode(err.to_string()))?
                .unwrap_or_default();
            game.accounts.insert(
                ovm_address,
                SimAccount {
                    record,
                    eth_address,
                    changed: false,
                    committed: false,
                },
            );
            Ok(())
        })
        .await
    }

    async fn prove_storage_slot(
        &self,
        ovm_address: Address,
        key: B256,
        storage_proof: Bytes,
    ) -> Result<(), ContractError> {
        self.write("proveStorageSlot", PRE_EXECUTION, |game, _| {
            let Some(account) = game.accounts.get(&ovm_address) else {
                return revert("Contract must be verified before proving a storage slot.");
            };
            if game.slots.contains_key(&(ovm_address, key)) {
                return revert("Storage slot has already been proven.");
            }
            let trie = decode_witness(&storage_proof)?;
            if trie.hash() != account.record.storage_root {
                return revert("Invalid root hash");
            }
            let value = match trie
                .get(keccak(key).as_slice())
                .map_err(|err| ContractError::Decode(err.to_string()))?
            {
                Some(mut raw) => B256::from(
                    U256::decode(&mut raw).map_err(|err| ContractError::Decode(err.to_string()))?,
                ),
                None => B256::ZERO,
            };
            game.slots.insert(
                (ovm_address, key),
                SimSlot {
                    value,
                    changed: false,
                    committed: false,
                },
            );
            Ok(())
        })
        .await
    }

    async fn apply_transaction(&self, _transaction: &OvmTransaction) -> Result<(), ContractError> {
        self.write("applyTransaction", PRE_EXECUTION, |game, effects| {
            apply_effects(game, effects)
        })
        .await
    }

    async fn commit_contract_state(
        &self,
        ovm_address: Address,
        state_trie_proof: Bytes,
    ) -> Result<(), ContractError> {
        self.write("commitContractState", POST_EXECUTION, |game, _| {
            if game.uncommitted_storage() != 0 {
                return revert("All storage must be committed before committing account states.");
            }
            let record = match game.accounts.get(&ovm_address) {
                Some(account) if account.changed && !account.committed => account.record,
                _ => return revert("Account state wasn't changed or has already been committed."),
            };
            let mut trie = decode_witness(&state_trie_proof)?;
            if trie.hash() != game.state_root {
                return revert("Invalid root hash");
            }
            trie.insert_rlp(keccak(ovm_address).as_slice(), record)
                .map_err(|err| ContractError::Decode(err.to_string()))?;
            game.state_root = trie.hash();
            if let Some(account) = game.accounts.get_mut(&ovm_address) {
                account.committed = true;
            }
            game.account_events.push(ovm_address);
            Ok(())
        })
        .await
    }

    async fn commit_storage_slot(
        &self,
        ovm_address: Address,
        key: B256,
        storage_trie_proof: Bytes,
    ) -> Result<(), ContractError> {
        self.write("commitStorageSlot", POST_EXECUTION, |game, _| {
            let value = match game.slots.get(&(ovm_address, key)) {
                Some(slot) if slot.changed && !slot.committed => slot.value,
                _ => {
                    return revert(
                        "Storage slot value wasn't changed or has already been committed.",
                    )
                }
            };
            let account = game
                .accounts
                .get_mut(&ovm_address)
                .ok_or(ContractError::Reverted { reason: None })?;
            let mut trie = decode_witness(&storage_trie_proof)?;
            if trie.hash() != account.record.storage_root {
                return revert("Invalid root hash");
            }
            trie.insert(keccak(key).as_slice(), encode_storage_value(value))
                .map_err(|err| ContractError::Decode(err.to_string()))?;
            account.record.storage_root = trie.hash();
            if let Some(slot) = game.slots.get_mut(&(ovm_address, key)) {
                slot.committed = true;
            }
            game.storage_events.push((ovm_address, key));
            Ok(())
        })
        .await
    }

    async fn complete_transition(&self) -> Result<(), ContractError> {
        self.write("completeTransition", POST_EXECUTION, |game, _| {
            if game.uncommitted_accounts() != 0 || game.uncommitted_storage() != 0 {
                return revert("All accounts must be committed before completing a transition.");
            }
            game.phase = COMPLETE;
            Ok(())
        })
        .await
    }

    async fn has_account(&self, address: Address) -> Result<bool, ContractError> {
        self.read(|g| g.accounts.contains_key(&address))
    }

    async fn has_contract_storage(&self, address: Address, key: B256) -> Result<bool, ContractError> {
        self.read(|g| g.slots.contains_key(&(address, key)))
    }

    async fn get_account(&self, address: Address) -> Result<StateAccount, ContractError> {
        self.read(|g| g.accounts.get(&address).map(|a| a.record).unwrap_or_default())
    }

    async fn get_contract_storage(&self, address: Address, key: B256) -> Result<B256, ContractError> {
        self.read(|g| g.slots.get(&(address, key)).map(|s| s.value).unwrap_or_default())
    }

    async fn was_account_changed(&self, address: Address) -> Result<bool, ContractError> {
        self.read(|g| g.accounts.get(&address).is_some_and(|a| a.changed))
    }

    async fn was_account_committed(&self, address: Address) -> Result<bool, ContractError> {
        self.read(|g| g.accounts.get(&address).is_some_and(|a| a.committed))
    }

    async fn was_contract_storage_changed(
        &self,
        address: Address,
        key: B256,
    ) -> Result<bool, ContractError> {
        self.read(|g| g.slots.get(&(address, key)).is_some_and(|s| s.changed))
    }

    async fn was_contract_storage_committed(
        &self,
        address: Address,
        key: B256,
    ) -> Result<bool, ContractError> {
        self.read(|g| g.slots.get(&(address, key)).is_some_and(|s| s.committed))
    }

    async fn total_uncommitted_accounts(&self) -> Result<u64, ContractError> {
        self.read(Game::uncommitted_accounts)
    }

    async fn total_uncommitted_contract_storage(&self) -> Result<u64, ContractError> {
        self.read(Game::uncommitted_storage)
    }

    async fn account_committed_events(&self) -> Result<Vec<Address>, ContractError> {
        self.read(|g| g.account_events.clone())
    }

    async fn storage_committed_events(&self) -> Result<Vec<(Address, B256)>, ContractError> {
        self.read(|g| g.storage_events.clone())
    }
}
