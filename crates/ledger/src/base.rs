//! Batch data published on the base chain.

use std::sync::Arc;

use alloy_primitives::{Address, B256};
use alloy_sol_types::SolCall;
use ovm_primitives::{
    batch::{
        BatchInclusionProof, ChainBatchHeader, StateRootBatchHeader, StateRootBatchProof,
    },
    merkle::batch_merkle_proof,
    transaction::{SequencerBatch, TransactionBatchProof, TransactionChainElement},
};
use tracing::{debug, info};

use crate::{
    cache::{EventCache, ScanSettings},
    client::BaseChainClient,
    contracts::IStateCommitmentChain,
    errors::LedgerError,
    types::{ChainEvent, EventFilter, EventKind, EventPayload},
};

/// Base chain contracts holding the state root and transaction batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchContracts {
    pub state_commitment_chain: Address,
    pub canonical_transaction_chain: Address,
}

/// Read-only view of the state root and transaction chains.
#[derive(Debug)]
pub struct BaseChainLedger<C> {
    client: Arc<C>,
    contracts: BatchContracts,
    cache: EventCache,
}

impl<C: BaseChainClient> BaseChainLedger<C> {
    pub fn new(client: Arc<C>, contracts: BatchContracts, settings: ScanSettings) -> Self {
        Self {
            client,
            contracts,
            cache: EventCache::new(settings),
        }
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn contracts(&self) -> &BatchContracts {
        &self.contracts
    }

    pub fn scan_settings(&self) -> &ScanSettings {
        self.cache.settings()
    }

    fn batch_filters(&self) -> [EventFilter; 4] {
        let scc = self.contracts.state_commitment_chain;
        let ctc = self.contracts.canonical_transaction_chain;
        [
            EventFilter::new(scc, EventKind::StateBatchAppended),
            EventFilter::new(scc, EventKind::StateBatchDeleted),
            EventFilter::new(ctc, EventKind::TransactionBatchAppended),
            EventFilter::new(ctc, EventKind::SequencerBatchAppended),
        ]
    }

    /// Runs the full historical scan of every batch event up front.
    pub async fn warm_cache(&self) -> Result<(), LedgerError> {
        for filter in self.batch_filters() {
            let events = self.find_all_events(filter).await?;
            info!(kind = ?filter.kind, count = events.len(), "event cache warmed");
        }
        Ok(())
    }

    /// Every event matching `filter` up to the current scan target.
    pub async fn find_all_events(&self, filter: EventFilter) -> Result<Vec<ChainEvent>, LedgerError> {
        Ok(self.cache.find_all_events(self.client.as_ref(), filter).await?)
    }

    /// The live `StateBatchAppended` event whose batch covers `index`.
    async fn find_state_batch_event(&self, index: u64) -> Result<Option<ChainEvent>, LedgerError> {
        let [appended, deleted, ..] = self.batch_filters();
        let appended = self.find_all_events(appended).await?;
        let deleted = self.find_all_events(deleted).await?;

        let live: Vec<ChainEvent> = appended
            .into_iter()
            .filter(|ev| covers(ev, index))
            .filter(|ev| !is_deleted(ev, &deleted))
            .collect();
        unique(index, live)
    }

    async fn find_transaction_batch_event(
        &self,
        index: u64,
    ) -> Result<Option<ChainEvent>, LedgerError> {
        let [_, _, appended, _] = self.batch_filters();
        let candidates: Vec<ChainEvent> = self
            .find_all_events(appended)
            .await?
            .into_iter()
            .filter(|ev| covers(ev, index))
            .collect();
        unique(index, candidates)
    }

    pub async fn get_state_root_batch_header(
        &self,
        index: u64,
    ) -> Result<Option<StateRootBatchHeader>, LedgerError> {
        Ok(self
            .find_state_batch_event(index)
            .await?
            .and_then(|ev| ev.payload.batch_header().cloned()))
    }

    /// All state roots of the batch covering `index`, decoded from its `appendStateBatch` call.
    pub async fn get_batch_state_roots(&self, index: u64) -> Result<Option<Vec<B256>>, LedgerError> {
        let Some(event) = self.find_state_batch_event(index).await? else {
            return Ok(None);
        };
        let input = self.client.transaction_input(event.tx_hash).await?;
        let call = IStateCommitmentChain::appendStateBatchCall::abi_decode(&input)?;
        Ok(Some(call._batch))
    }

    pub async fn get_state_root(&self, index: u64) -> Result<Option<B256>, LedgerError> {
        Ok(self
            .get_state_root_batch_proof(index)
            .await?
            .map(|proof| proof.state_root()))
    }

    /// State root at `index` with its inclusion proof against the batch header.
    pub async fn get_state_root_batch_proof(
        &self,
        index: u64,
    ) -> Result<Option<StateRootBatchProof>, LedgerError> {
        let Some(event) = self.find_state_batch_event(index).await? else {
            return Ok(None);
        };
        let Some(header) = event.payload.batch_header().cloned() else {
            return Ok(None);
        };

        let input = self.client.transaction_input(event.tx_hash).await?;
        let roots = IStateCommitmentChain::appendStateBatchCall::abi_decode(&input)?._batch;
        let position = position_in(&header, index, roots.len())?;

        let (root, merkle_path) = batch_merkle_proof(&roots, position)?;
        ensure_root(&header, root)?;

        Ok(Some(BatchInclusionProof {
            leaf_value: roots[position],
            batch_header: header,
            merkle_path,
        }))
    }

    /// First base chain block holding both the pre-state root of `index` and the transaction
    /// at `index`. A transitioner for that dispute cannot exist before it.
    pub async fn get_dispute_inputs_block(&self, index: u64) -> Result<Option<u64>, LedgerError> {
        let Some(pre_index) = index.checked_sub(1) else {
            return Ok(None);
        };
        let Some(state_batch) = self.find_state_batch_event(pre_index).await? else {
            return Ok(None);
        };
        let Some(transaction_batch) = self.find_transaction_batch_event(index).await? else {
            return Ok(None);
        };
        Ok(Some(state_batch.block_number.max(transaction_batch.block_number)))
    }

    async fn decode_sequencer_batch(&self, event: &ChainEvent) -> Result<SequencerBatch, LedgerError> {
        let [_, _, _, sequencer] = self.batch_filters();
        let paired = self
            .find_all_events(sequencer)
            .await?
            .into_iter()
            .any(|ev| ev.tx_hash == event.tx_hash);
        if !paired {
            let batch_index = event
                .payload
                .batch_header()
                .map(|h| h.batch_index)
                .unwrap_or_default();
            return Err(LedgerError::NotSequencerBatch { batch_index });
        }

        let input = self.client.transaction_input(event.tx_hash).await?;
        Ok(SequencerBatch::decode(&input)?)
    }

    /// Transaction at `index` with its chain element and inclusion proof.
    pub async fn get_transaction_batch_proof(
        &self,
        index: u64,
    ) -> Result<Option<TransactionBatchProof>, LedgerError> {
        let Some(event) = self.find_transaction_batch_event(index).await? else {
            return Ok(None);
        };
        let Some(header) = event.payload.batch_header().cloned() else {
            return Ok(None);
        };

        let elements = self.decode_sequencer_batch(&event).await?.chain_elements();
        let position = position_in(&header, index, elements.len())?;

        let leaves = elements
            .iter()
            .map(TransactionChainElement::leaf_hash)
            .collect::<Result<Vec<_>, _>>()?;
        let (root, transaction_proof) = batch_merkle_proof(&leaves, position)?;
        ensure_root(&header, root)?;

        let gas_limit = self.client.max_transaction_gas_limit().await?;
        let element = elements[position].clone();
        debug!(%index, batch_index = header.batch_index, %position, "built transaction proof");

        Ok(Some(TransactionBatchProof {
            transaction: element.to_sequenced_transaction(gas_limit),
            transaction_chain_element: element,
            transaction_batch_header: header,
            transaction_proof,
        }))
    }
}

fn covers(event: &ChainEvent, index: u64) -> bool {
    event
        .payload
        .batch_header()
        .is_some_and(|header| header.contains(index))
}

/// A batch is dead once a deletion of the same batch index is logged after it.
fn is_deleted(appended: &ChainEvent, deletions: &[ChainEvent]) -> bool {
    let Some(header) = appended.payload.batch_header() else {
        return false;
    };
    deletions.iter().any(|del| match del.payload {
        EventPayload::StateBatchDeleted { batch_index, .. } => {
            batch_index == header.batch_index
                && (del.block_number, del.log_index) > (appended.block_number, appended.log_index)
        }
        _ => false,
    })
}

fn unique(index: u64, mut candidates: Vec<ChainEvent>) -> Result<Option<ChainEvent>, LedgerError> {
    match candidates.len() {
        0 | 1 => Ok(candidates.pop()),
        count => Err(LedgerError::AmbiguousBatch { index, count }),
    }
}

fn position_in(header: &ChainBatchHeader, index: u64, available: usize) -> Result<usize, LedgerError> {
    header
        .position_of(index)
        .filter(|pos| *pos < available)
        .ok_or(LedgerError::ElementMissing { index, available })
}

fn ensure_root(header: &ChainBatchHeader, computed: B256) -> Result<(), LedgerError> {
    if computed != header.batch_root {
        return Err(LedgerError::BatchRootMismatch {
            batch_index: header.batch_index,
            expected: header.batch_root,
            computed,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use alloy_primitives::{Bytes, U256};
    use ovm_primitives::{codec::encode_uint, merkle::compute_root, transaction::SEQUENCER_ENTRYPOINT};

    use super::*;
    use crate::{client::MockBaseChainClient, errors::ClientError};

    const SCC: Address = Address::repeat_byte(0x5c);
    const CTC: Address = Address::repeat_byte(0xc7);
    const GAS_LIMIT: u64 = 9_000_000;

    fn contracts() -> BatchContracts {
        BatchContracts {
            state_commitment_chain: SCC,
            canonical_transaction_chain: CTC,
        }
    }

    fn roots(seed: u8, n: usize) -> Vec<B256> {
        (0..n).map(|i| B256::repeat_byte(seed ^ i as u8)).collect()
    }

    fn merkle_root(leaves: &[B256]) -> B256 {
        batch_merkle_proof(leaves, 0).unwrap().0
    }

    fn header(batch_index: u64, batch_root: B256, size: u64, prev: u64) -> ChainBatchHeader {
        ChainBatchHeader {
            batch_index,
            batch_root,
            batch_size: size,
            prev_total_elements: prev,
            extra_data: Bytes::new(),
        }
    }

    /// Base chain fixture: events plus the calldata of the transactions that emitted them.
    #[derive(Default)]
    struct Chain {
        events: Vec<ChainEvent>,
        inputs: HashMap<B256, Bytes>,
    }

    impl Chain {
        fn append_state_batch(&mut self, block: u64, batch_index: u64, prev: u64, batch: Vec<B256>) {
            self.append_state_batch_with_root(block, batch_index, prev, merkle_root(&batch), batch);
        }

        fn append_state_batch_with_root(
            &mut self,
            block: u64,
            batch_index: u64,
            prev: u64,
            root: B256,
            batch: Vec<B256>,
        ) {
            let tx_hash = B256::with_last_byte(block as u8);
            let size = batch.len() as u64;
            let call = IStateCommitmentChain::appendStateBatchCall {
                _batch: batch,
                _shouldStartAtElement: U256::from(prev),
            };
            self.inputs.insert(tx_hash, call.abi_encode().into());
            self.events.push(ChainEvent {
                block_number: block,
                tx_hash,
                log_index: 0,
                payload: EventPayload::StateBatchAppended(header(batch_index, root, size, prev)),
            });
        }

        fn delete_state_batch(&mut self, block: u64, batch_index: u64) {
            self.events.push(ChainEvent {
                block_number: block,
                tx_hash: B256::with_last_byte(block as u8),
                log_index: 0,
                payload: EventPayload::StateBatchDeleted {
                    batch_index,
                    batch_root: B256::ZERO,
                },
            });
        }

        /// Appends a sequencer batch with one context per `(timestamp, block, txs)` entry.
        fn append_sequencer_batch(
            &mut self,
            block: u64,
            batch_index: u64,
            prev: u64,
            contexts: &[(u64, u64, Vec<Vec<u8>>)],
            root: Option<B256>,
        ) {
            let tx_hash = B256::with_last_byte(block as u8);
            let total: usize = contexts.iter().map(|(_, _, txs)| txs.len()).sum();

            let mut calldata = vec![0xd0, 0xf8, 0x93, 0x44];
            let push = |buf: &mut Vec<u8>, v: u64, w: usize| {
                buf.extend(encode_uint(U256::from(v), w).unwrap())
            };
            push(&mut calldata, prev, 5);
            push(&mut calldata, total as u64, 3);
            push(&mut calldata, contexts.len() as u64, 3);
            for (ts, bn, txs) in contexts {
                push(&mut calldata, txs.len() as u64, 3);
                push(&mut calldata, 0, 3);
                push(&mut calldata, *ts, 5);
                push(&mut calldata, *bn, 5);
            }
            let mut leaves = Vec::new();
            for (ts, bn, txs) in contexts {
                for tx in txs {
                    push(&mut calldata, tx.len() as u64, 3);
                    calldata.extend_from_slice(tx);
                    leaves.push(
                        TransactionChainElement {
                            is_sequenced: true,
                            queue_index: 0,
                            timestamp: *ts,
                            block_number: *bn,
                            tx_data: Bytes::copy_from_slice(tx),
                        }
                        .leaf_hash()
                        .unwrap(),
                    );
                }
            }

            let root = root.unwrap_or_else(|| merkle_root(&leaves));
            self.inputs.insert(tx_hash, calldata.into());
            self.events.push(ChainEvent {
                block_number: block,
                tx_hash,
                log_index: 0,
                payload: EventPayload::TransactionBatchAppended(header(
                    batch_index,
                    root,
                    total as u64,
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
                    total_elements: prev + total as u64,
                },
            });
        }

        fn into_ledger(self) -> BaseChainLedger<MockBaseChainClient> {
            let Chain { events, inputs } = self;
            let head = events.iter().map(|e| e.block_number).max().unwrap_or(0) + 1;

            let mut client = MockBaseChainClient::new();
            client.expect_block_number().returning(move || Ok(head));
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

            BaseChainLedger::new(Arc::new(client), contracts(), ScanSettings::default())
        }
    }

    #[tokio::test]
    async fn test_state_root_lookup_across_batches() {
        let mut chain = Chain::default();
        chain.append_state_batch(10, 0, 0, roots(0x10, 4));
        chain.append_state_batch(11, 1, 4, roots(0x20, 3));
        let ledger = chain.into_ledger();
        ledger.warm_cache().await.unwrap();

        assert_eq!(
            ledger.get_state_root(2).await.unwrap(),
            Some(B256::repeat_byte(0x10 ^ 2))
        );
        assert_eq!(
            ledger.get_state_root(6).await.unwrap(),
            Some(B256::repeat_byte(0x20 ^ 2))
        );
        assert_eq!(ledger.get_state_root(7).await.unwrap(), None);

        let header = ledger.get_state_root_batch_header(5).await.unwrap().unwrap();
        assert_eq!(header.batch_index, 1);
        assert_eq!(ledger.get_batch_state_roots(5).await.unwrap(), Some(roots(0x20, 3)));
    }

    #[tokio::test]
    async fn test_deleted_batch_is_replaced() {
        let mut chain = Chain::default();
        chain.append_state_batch(10, 0, 0, roots(0xaa, 4));
        chain.delete_state_batch(12, 0);
        chain.append_state_batch(14, 0, 0, roots(0xbb, 4));
        let ledger = chain.into_ledger();

        let header = ledger.get_state_root_batch_header(1).await.unwrap().unwrap();
        assert_eq!(header.batch_root, merkle_root(&roots(0xbb, 4)));
        assert_eq!(
            ledger.get_state_root(1).await.unwrap(),
            Some(B256::repeat_byte(0xbb ^ 1))
        );
    }

    #[tokio::test]
    async fn test_deletion_before_append_does_not_apply() {
        let mut chain = Chain::default();
        chain.delete_state_batch(5, 0);
        chain.append_state_batch(10, 0, 0, roots(0xaa, 2));
        let ledger = chain.into_ledger();

        assert!(ledger.get_state_root_batch_header(0).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overlapping_live_batches_are_ambiguous() {
        let mut chain = Chain::default();
        chain.append_state_batch(10, 0, 0, roots(0xaa, 4));
        chain.append_state_batch(11, 1, 2, roots(0xbb, 4));
        let ledger = chain.into_ledger();

        let err = ledger.get_state_root_batch_header(3).await.unwrap_err();
        assert!(matches!(err, LedgerError::AmbiguousBatch { index: 3, count: 2 }));
        assert!(ledger.get_state_root_batch_header(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_state_root_proof_verifies() {
        let batch = roots(0x42, 5);
        let mut chain = Chain::default();
        chain.append_state_batch(10, 0, 100, batch.clone());
        let ledger = chain.into_ledger();

        let proof = ledger.get_state_root_batch_proof(103).await.unwrap().unwrap();
        assert_eq!(proof.leaf_value, batch[3]);
        assert_eq!(proof.merkle_path.index, 3);
        assert_eq!(proof.merkle_path.siblings.len(), 3);
        assert_eq!(
            compute_root(proof.leaf_value, &proof.merkle_path),
            proof.batch_header.batch_root
        );
    }

    #[tokio::test]
    async fn test_state_root_proof_rejects_wrong_root() {
        let mut chain = Chain::default();
        chain.append_state_batch_with_root(10, 0, 0, B256::repeat_byte(0xee), roots(0x42, 2));
        let ledger = chain.into_ledger();

        let err = ledger.get_state_root_batch_proof(1).await.unwrap_err();
        assert!(matches!(err, LedgerError::BatchRootMismatch { batch_index: 0, .. }));
    }

    #[tokio::test]
    async fn test_transaction_proof_from_sequencer_calldata() {
        let mut chain = Chain::default();
        chain.append_sequencer_batch(
            20,
            0,
            10,
            &[
                (1_000, 7, vec![vec![0x01], vec![0x02, 0x02]]),
                (1_010, 8, vec![vec![0x03, 0x03, 0x03]]),
            ],
            None,
        );
        let ledger = chain.into_ledger();

        let proof = ledger.get_transaction_batch_proof(12).await.unwrap().unwrap();
        assert_eq!(proof.transaction_proof.index, 2);
        assert_eq!(proof.transaction_chain_element.timestamp, 1_010);
        assert_eq!(proof.transaction.block_number, 8);
        assert_eq!(proof.transaction.entrypoint, SEQUENCER_ENTRYPOINT);
        assert_eq!(proof.transaction.l1_tx_origin, Address::ZERO);
        assert_eq!(proof.transaction.gas_limit, U256::from(GAS_LIMIT));
        assert_eq!(proof.transaction.data, Bytes::from_static(b"\x03\x03\x03"));
        assert_eq!(
            compute_root(
                proof.transaction_chain_element.leaf_hash().unwrap(),
                &proof.transaction_proof
            ),
            proof.transaction_batch_header.batch_root
        );

        assert!(ledger.get_transaction_batch_proof(13).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transaction_batch_without_sequencer_event() {
        let mut chain = Chain::default();
        chain.append_sequencer_batch(20, 4, 0, &[(1, 1, vec![vec![0x01]])], None);
        chain
            .events
            .retain(|e| e.payload.kind() != EventKind::SequencerBatchAppended);
        let ledger = chain.into_ledger();

        let err = ledger.get_transaction_batch_proof(0).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotSequencerBatch { batch_index: 4 }));
    }

    #[tokio::test]
    async fn test_dispute_inputs_block() {
        let mut chain = Chain::default();
        chain.append_state_batch(10, 0, 0, roots(0x10, 4));
        chain.append_sequencer_batch(12, 0, 0, &[(1, 1, vec![vec![0x01]; 4])], None);
        chain.append_state_batch(15, 1, 4, roots(0x20, 4));
        chain.append_sequencer_batch(18, 1, 4, &[(2, 2, vec![vec![0x02]; 4])], None);
        let ledger = chain.into_ledger();

        // Pre-state in the first state batch, transaction in the first sequencer batch.
        assert_eq!(ledger.get_dispute_inputs_block(2).await.unwrap(), Some(12));
        // Pre-state index 3 is in batch 0, transaction 4 only arrives at block 18.
        assert_eq!(ledger.get_dispute_inputs_block(4).await.unwrap(), Some(18));
        assert_eq!(ledger.get_dispute_inputs_block(0).await.unwrap(), None);
        assert_eq!(ledger.get_dispute_inputs_block(9).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transaction_proof_rejects_wrong_root() {
        let mut chain = Chain::default();
        chain.append_sequencer_batch(
            20,
            0,
            0,
            &[(1, 1, vec![vec![0x01], vec![0x02]])],
            Some(B256::ZERO),
        );
        let ledger = chain.into_ledger();

        let err = ledger.get_transaction_batch_proof(1).await.unwrap_err();
        assert!(matches!(err, LedgerError::BatchRootMismatch { .. }));
    }
}
