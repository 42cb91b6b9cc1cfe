//! OVM transactions, chain elements and sequencer batch calldata.

use alloy_primitives::{address, keccak256, Address, Bytes, B256, U256};

use crate::{
    batch::{ChainInclusionProof, TransactionBatchHeader},
    codec::{encode_uint, read_bytes, read_u64},
    errors::CodecError,
};

/// Entrypoint of every sequenced transaction (the OVM sequencer entrypoint predeploy).
pub const SEQUENCER_ENTRYPOINT: Address = address!("4200000000000000000000000000000000000005");

/// Queue origin of sequencer-submitted transactions.
pub const QUEUE_ORIGIN_SEQUENCER: u8 = 0;

/// Prefix byte of a sequenced transaction leaf in the transaction batch tree.
const SEQUENCED_LEAF_PREFIX: u8 = 0x01;

/// Canonical encoding of one rollup transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OvmTransaction {
    pub timestamp: u64,
    pub block_number: u64,
    pub l1_queue_origin: u8,
    pub l1_tx_origin: Address,
    pub entrypoint: Address,
    pub gas_limit: U256,
    pub data: Bytes,
}

impl OvmTransaction {
    /// Packed encoding: `uint256 ts ‖ uint256 block ‖ uint8 origin ‖ address ‖ address ‖
    /// uint256 gas ‖ data`.
    pub fn encode_packed(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(32 * 3 + 1 + 20 * 2 + self.data.len());
        buf.extend(encode_uint(U256::from(self.timestamp), 32)?);
        buf.extend(encode_uint(U256::from(self.block_number), 32)?);
        buf.push(self.l1_queue_origin);
        buf.extend_from_slice(self.l1_tx_origin.as_slice());
        buf.extend_from_slice(self.entrypoint.as_slice());
        buf.extend(encode_uint(self.gas_limit, 32)?);
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    /// Transaction hash, the second half of a dispute's identity.
    pub fn hash(&self) -> Result<B256, CodecError> {
        Ok(keccak256(self.encode_packed()?))
    }
}

/// Element of the canonical transaction chain as the verifier sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionChainElement {
    pub is_sequenced: bool,
    pub queue_index: u64,
    pub timestamp: u64,
    pub block_number: u64,
    pub tx_data: Bytes,
}

impl TransactionChainElement {
    /// Leaf committed to in the transaction batch tree.
    pub fn leaf_hash(&self) -> Result<B256, CodecError> {
        let mut buf = Vec::with_capacity(1 + 64 + self.tx_data.len());
        buf.push(SEQUENCED_LEAF_PREFIX);
        buf.extend(encode_uint(U256::from(self.timestamp), 32)?);
        buf.extend(encode_uint(U256::from(self.block_number), 32)?);
        buf.extend_from_slice(&self.tx_data);
        Ok(keccak256(buf))
    }
}

/// Everything the verifier needs to accept a disputed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBatchProof {
    pub transaction: OvmTransaction,
    pub transaction_chain_element: TransactionChainElement,
    pub transaction_batch_header: TransactionBatchHeader,
    pub transaction_proof: ChainInclusionProof,
}

/// One context record of `appendSequencerBatch` calldata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchContext {
    pub num_sequenced_transactions: u64,
    pub num_subsequent_queue_transactions: u64,
    pub timestamp: u64,
    pub block_number: u64,
}

/// Decoded `appendSequencerBatch` calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerBatch {
    pub should_start_at_element: u64,
    pub total_elements_to_append: u64,
    pub contexts: Vec<BatchContext>,
    /// Sequenced transaction payloads in submission order, paired with their context index.
    pub transactions: Vec<(usize, Bytes)>,
}

const CONTEXT_SIZE: usize = 16;
const HEADER_END: usize = 15;

impl SequencerBatch {
    /// Decodes the custom packed layout that follows the 4-byte selector.
    pub fn decode(calldata: &[u8]) -> Result<Self, CodecError> {
        if calldata.len() < 4 {
            return Err(CodecError::MissingSelector);
        }

        let should_start_at_element = read_u64(calldata, 4, 5)?;
        let total_elements_to_append = read_u64(calldata, 9, 3)?;
        let num_contexts = read_u64(calldata, 12, 3)? as usize;

        let mut contexts = Vec::with_capacity(num_contexts);
        for i in 0..num_contexts {
            let at = HEADER_END + CONTEXT_SIZE * i;
            contexts.push(BatchContext {
                num_sequenced_transactions: read_u64(calldata, at, 3)?,
                num_subsequent_queue_transactions: read_u64(calldata, at + 3, 3)?,
                timestamp: read_u64(calldata, at + 6, 5)?,
                block_number: read_u64(calldata, at + 11, 5)?,
            });
        }

        let mut cursor = HEADER_END + CONTEXT_SIZE * num_contexts;
        let mut transactions = Vec::new();
        for (ctx_idx, ctx) in contexts.iter().enumerate() {
            for _ in 0..ctx.num_sequenced_transactions {
                let len = read_u64(calldata, cursor, 3)? as usize;
                let data = read_bytes(calldata, cursor + 3, len)?;
                transactions.push((ctx_idx, Bytes::copy_from_slice(data)));
                cursor += 3 + len;
            }
        }

        Ok(Self {
            should_start_at_element,
            total_elements_to_append,
            contexts,
            transactions,
        })
    }

    /// Chain elements for the sequenced transactions of this batch.
    pub fn chain_elements(&self) -> Vec<TransactionChainElement> {
        self.transactions
            .iter()
            .map(|(ctx_idx, data)| {
                let ctx = &self.contexts[*ctx_idx];
                TransactionChainElement {
                    is_sequenced: true,
                    queue_index: 0,
                    timestamp: ctx.timestamp,
                    block_number: ctx.block_number,
                    tx_data: data.clone(),
                }
            })
            .collect()
    }
}

impl TransactionChainElement {
    /// The transaction the verifier replays for a sequenced element.
    pub fn to_sequenced_transaction(&self, gas_limit: U256) -> OvmTransaction {
        OvmTransaction {
            timestamp: self.timestamp,
            block_number: self.block_number,
            l1_queue_origin: QUEUE_ORIGIN_SEQUENCER,
            l1_tx_origin: Address::ZERO,
            entrypoint: SEQUENCER_ENTRYPOINT,
            gas_limit,
            data: self.tx_data.clone(),
        }
    }
}
