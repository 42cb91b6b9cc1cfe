//! Drives one state transitioner from initialization to finalization.
//!
//! Several provers may work on the same transitioner at once. The driver never trusts its own
//! view of the game: it re-reads the phase before every write and treats reverts that mean
//! "someone already did this" as progress.

use std::sync::Arc;

use alloy_primitives::{address, Address, B256};
use ovm_ledger::{client::RollupClient, RollupLedger};
use ovm_mpt::keccak;
use ovm_primitives::{
    phase::TransitionPhase,
    rlp::{copier_init_code, encode_proof_nodes, encode_storage_value},
};
use rand::{seq::SliceRandom, Rng};
use tracing::{debug, info, info_span, Instrument};

use crate::{
    assembler::FraudProofData,
    contracts::{classify, DisputeContracts, StateTransitioner, Step, SubmitOutcome},
    errors::{ContractError, DisputeError},
};

/// Stand-in code address for accounts that have no code.
pub const EMPTY_CODE_ADDRESS: Address = address!("0000c0de0000c0de0000c0de0000c0de0000c0de");

/// How a dispute ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisputeOutcome {
    /// This prover's `finalizeFraudVerification` went through.
    Finalized,
    /// Finalization reverted because another prover already finished the game.
    FinalizedElsewhere,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub max_stalled_rounds: u32,
}

#[derive(Debug)]
pub struct DisputeDriver<C, R, Rn> {
    contracts: Arc<C>,
    rollup: Arc<RollupLedger<R>>,
    settings: DriverSettings,
    rng: Rn,
}

impl<C, R, Rn> DisputeDriver<C, R, Rn>
where
    C: DisputeContracts,
    R: RollupClient,
    Rn: Rng + Send,
{
    pub fn new(
        contracts: Arc<C>,
        rollup: Arc<RollupLedger<R>>,
        settings: DriverSettings,
        rng: Rn,
    ) -> Self {
        Self {
            contracts,
            rollup,
            settings,
            rng,
        }
    }

    /// Plays the dispute for `data` until the transitioner is finalized.
    ///
    /// The tries in `data` are updated with the post-state committed on chain.
    pub async fn resolve(&mut self, data: &mut FraudProofData) -> Result<DisputeOutcome, DisputeError> {
        let tx_hash = data.transaction_proof.transaction.hash()?;
        let pre_state_root = data.pre_state_root_proof.state_root();
        let span = info_span!("dispute", index = data.index, %pre_state_root, %tx_hash);
        self.resolve_inner(data, pre_state_root, tx_hash)
            .instrument(span)
            .await
    }

    async fn resolve_inner(
        &mut self,
        data: &mut FraudProofData,
        pre_state_root: B256,
        tx_hash: B256,
    ) -> Result<DisputeOutcome, DisputeError> {
        let address = self.initialize(data, pre_state_root, tx_hash).await?;
        let transitioner = self.contracts.transitioner(address, data.index).await?;

        let mut phase = read_phase(&transitioner).await?;
        info!(transitioner = %address, %phase, "playing dispute");
        loop {
            match phase {
                TransitionPhase::PreExecution => self.pre_execution(&transitioner, data).await?,
                TransitionPhase::PostExecution => self.post_execution(&transitioner, data).await?,
                TransitionPhase::Complete => return self.finalize(data, tx_hash).await,
            }

            let next = read_phase(&transitioner).await?;
            if next <= phase {
                return Err(DisputeError::PhaseNotAdvanced { phase });
            }
            debug!(transitioner = %address, from = %phase, to = %next, "phase advanced");
            phase = next;
        }
    }

    /// Returns the dispute's transitioner, creating it if nobody has yet.
    async fn initialize(
        &self,
        data: &FraudProofData,
        pre_state_root: B256,
        tx_hash: B256,
    ) -> Result<Address, DisputeError> {
        let existing = self
            .contracts
            .get_state_transitioner(pre_state_root, tx_hash)
            .await?;
        if !existing.is_zero() {
            debug!(transitioner = %existing, "joining existing dispute");
            return Ok(existing);
        }

        let result = self
            .contracts
            .initialize_fraud_verification(&data.pre_state_root_proof, &data.transaction_proof)
            .await;
        submitted(Address::ZERO, Step::Initialize, result)?;

        let address = self
            .contracts
            .get_state_transitioner(pre_state_root, tx_hash)
            .await?;
        if address.is_zero() {
            return Err(DisputeError::DataUnavailable("state transitioner"));
        }
        Ok(address)
    }

    async fn pre_execution(
        &mut self,
        transitioner: &C::Transitioner,
        data: &FraudProofData,
    ) -> Result<(), DisputeError> {
        let accounts = data.accounts();
        let mut order: Vec<usize> = (0..accounts.len()).collect();

        order.shuffle(&mut self.rng);
        for &i in &order {
            let account = &accounts[i];
            if !in_phase(transitioner, TransitionPhase::PreExecution).await? {
                return Ok(());
            }
            if transitioner.has_account(account.address).await? {
                continue;
            }

            let eth_address = self
                .deploy_account_code(account.address, data.pre_state_block)
                .await?;
            let proof = encode_proof_nodes(&account.account_proof);
            let result = transitioner
                .prove_contract_state(account.address, eth_address, proof)
                .await;
            submitted(transitioner.address(), Step::ProveContractState, result)?;
        }

        order.shuffle(&mut self.rng);
        for &i in &order {
            let account = &accounts[i];
            let mut slots: Vec<usize> = (0..account.storage_proof.len()).collect();
            slots.shuffle(&mut self.rng);

            for j in slots {
                let slot = &account.storage_proof[j];
                if !in_phase(transitioner, TransitionPhase::PreExecution).await? {
                    return Ok(());
                }
                if transitioner
                    .has_contract_storage(account.address, slot.key)
                    .await?
                {
                    continue;
                }

                let proof = encode_proof_nodes(&slot.proof);
                let result = transitioner
                    .prove_storage_slot(account.address, slot.key, proof)
                    .await;
                submitted(transitioner.address(), Step::ProveStorageSlot, result)?;
            }
        }

        if !in_phase(transitioner, TransitionPhase::PreExecution).await? {
            return Ok(());
        }
        let result = transitioner
            .apply_transaction(&data.transaction_proof.transaction)
            .await;
        submitted(transitioner.address(), Step::ApplyTransaction, result)?;
        Ok(())
    }

    /// Address whose code stands in for `ovm_address` in its account proof.
    async fn deploy_account_code(
        &self,
        ovm_address: Address,
        block: u64,
    ) -> Result<Address, DisputeError> {
        let code = self.rollup.code_at(ovm_address, block).await?;
        if code.is_empty() {
            return Ok(EMPTY_CODE_ADDRESS);
        }

        let deployed = self
            .contracts
            .deploy_code(copier_init_code(&code))
            .await
            .map_err(|source| DisputeError::Contract {
                step: Step::DeployCode,
                source,
            })?;
        debug!(%ovm_address, %deployed, code_len = code.len(), "deployed account code");
        Ok(deployed)
    }

    async fn post_execution(
        &mut self,
        transitioner: &C::Transitioner,
        data: &mut FraudProofData,
    ) -> Result<(), DisputeError> {
        let mut stall = StallCounter::new(self.settings.max_stalled_rounds);
        loop {
            if !in_phase(transitioner, TransitionPhase::PostExecution).await? {
                return Ok(());
            }
            let pending = transitioner.total_uncommitted_contract_storage().await?;
            if pending == 0 {
                break;
            }
            stall.observe(pending)?;

            fold_committed_storage(transitioner, data).await?;
            let candidates = self.storage_candidates(transitioner, data).await?;
            if candidates.is_empty() {
                return Err(DisputeError::MissingProofData { pending });
            }

            for (address, key) in candidates {
                if !in_phase(transitioner, TransitionPhase::PostExecution).await? {
                    return Ok(());
                }
                let trie = data.storage_tries.get(&address).ok_or_else(|| {
                    DisputeError::MalformedProof(format!("no storage trie for {address}"))
                })?;
                let proof = encode_proof_nodes(&trie.prove(keccak(key).as_slice())?);
                let result = transitioner.commit_storage_slot(address, key, proof).await;
                submitted(transitioner.address(), Step::CommitStorageSlot, result)?;
            }
        }

        let mut stall = StallCounter::new(self.settings.max_stalled_rounds);
        loop {
            if !in_phase(transitioner, TransitionPhase::PostExecution).await? {
                return Ok(());
            }
            let pending = transitioner.total_uncommitted_accounts().await?;
            if pending == 0 {
                break;
            }
            stall.observe(pending)?;

            fold_committed_accounts(transitioner, data).await?;
            let Some(address) = self.account_candidate(transitioner, data).await? else {
                return Err(DisputeError::MissingProofData { pending });
            };

            if !in_phase(transitioner, TransitionPhase::PostExecution).await? {
                return Ok(());
            }
            let proof = encode_proof_nodes(&data.state_trie.prove(keccak(address).as_slice())?);
            let result = transitioner.commit_contract_state(address, proof).await;
            submitted(transitioner.address(), Step::CommitContractState, result)?;
        }

        if !in_phase(transitioner, TransitionPhase::PostExecution).await? {
            return Ok(());
        }
        let result = transitioner.complete_transition().await;
        submitted(transitioner.address(), Step::CompleteTransition, result)?;
        Ok(())
    }

    /// One uncommitted changed slot per account, accounts and slots in random order.
    ///
    /// Only one slot per account goes out per round since every commit moves that account's
    /// storage root and stales proofs built before it.
    async fn storage_candidates(
        &mut self,
        transitioner: &C::Transitioner,
        data: &FraudProofData,
    ) -> Result<Vec<(Address, B256)>, DisputeError> {
        let accounts = data.accounts();
        let mut order: Vec<usize> = (0..accounts.len()).collect();
        order.shuffle(&mut self.rng);

        let mut candidates = Vec::new();
        for i in order {
            let account = &accounts[i];
            let mut slots: Vec<usize> = (0..account.storage_proof.len()).collect();
            slots.shuffle(&mut self.rng);

            for j in slots {
                let key = account.storage_proof[j].key;
                if transitioner
                    .was_contract_storage_changed(account.address, key)
                    .await?
                    && !transitioner
                        .was_contract_storage_committed(account.address, key)
                        .await?
                {
                    candidates.push((account.address, key));
                    break;
                }
            }
        }
        Ok(candidates)
    }

    async fn account_candidate(
        &mut self,
        transitioner: &C::Transitioner,
        data: &FraudProofData,
    ) -> Result<Option<Address>, DisputeError> {
        let mut addresses: Vec<Address> = data.accounts().iter().map(|a| a.address).collect();
        addresses.shuffle(&mut self.rng);

        for address in addresses {
            if transitioner.was_account_changed(address).await?
                && !transitioner.was_account_committed(address).await?
            {
                return Ok(Some(address));
            }
        }
        Ok(None)
    }

    async fn finalize(
        &self,
        data: &FraudProofData,
        tx_hash: B256,
    ) -> Result<DisputeOutcome, DisputeError> {
        let result = self
            .contracts
            .finalize_fraud_verification(
                &data.pre_state_root_proof,
                tx_hash,
                &data.post_state_root_proof,
            )
            .await;

        let outcome = match submitted(Address::ZERO, Step::Finalize, result)? {
            SubmitOutcome::Applied => DisputeOutcome::Finalized,
            SubmitOutcome::LostRace { .. } => DisputeOutcome::FinalizedElsewhere,
        };
        info!(index = data.index, ?outcome, "dispute finished");
        Ok(outcome)
    }
}

/// Classifies a write and logs lost races.
fn submitted(
    transitioner: Address,
    step: Step,
    result: Result<(), ContractError>,
) -> Result<SubmitOutcome, DisputeError> {
    let outcome = classify(step, result)?;
    match &outcome {
        SubmitOutcome::Applied => debug!(%transitioner, %step, "submitted"),
        SubmitOutcome::LostRace { reason } => info!(
            %transitioner,
            %step,
            reason = reason.as_deref().unwrap_or("<no reason>"),
            "step already done by another prover"
        ),
    }
    Ok(outcome)
}

async fn read_phase(transitioner: &impl StateTransitioner) -> Result<TransitionPhase, DisputeError> {
    Ok(TransitionPhase::try_from(transitioner.phase().await?)?)
}

async fn in_phase(
    transitioner: &impl StateTransitioner,
    expected: TransitionPhase,
) -> Result<bool, DisputeError> {
    Ok(read_phase(transitioner).await? == expected)
}

/// Writes the current value of every committed slot into the storage tries.
///
/// A zero value is written as the RLP empty string, the same way the transitioner updates its
/// trie, so the key stays present.
async fn fold_committed_storage(
    transitioner: &impl StateTransitioner,
    data: &mut FraudProofData,
) -> Result<(), DisputeError> {
    for (address, key) in transitioner.storage_committed_events().await? {
        let value = transitioner.get_contract_storage(address, key).await?;
        let trie = data.storage_tries.get_mut(&address).ok_or_else(|| {
            DisputeError::MalformedProof(format!("slot committed for unproven account {address}"))
        })?;
        trie.insert(keccak(key).as_slice(), encode_storage_value(value))?;
    }
    Ok(())
}

async fn fold_committed_accounts(
    transitioner: &impl StateTransitioner,
    data: &mut FraudProofData,
) -> Result<(), DisputeError> {
    for address in transitioner.account_committed_events().await? {
        let account = transitioner.get_account(address).await?;
        data.state_trie
            .insert_rlp(keccak(address).as_slice(), account)?;
    }
    Ok(())
}

/// Counts commit rounds in which the outstanding count did not shrink.
#[derive(Debug)]
struct StallCounter {
    limit: u32,
    last: Option<u64>,
    rounds: u32,
}

impl StallCounter {
    fn new(limit: u32) -> Self {
        Self {
            limit,
            last: None,
            rounds: 0,
        }
    }

    fn observe(&mut self, pending: u64) -> Result<(), DisputeError> {
        match self.last {
            Some(last) if pending >= last => {
                self.rounds += 1;
                if self.rounds >= self.limit {
                    return Err(DisputeError::CommitStalled {
                        rounds: self.rounds,
                        pending,
                    });
                }
            }
            _ => self.rounds = 0,
        }
        self.last = Some(pending);
        Ok(())
    }
}
