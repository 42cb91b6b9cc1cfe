//! Codec, batch and proof primitives shared by the fraud prover crates.

pub mod batch;
pub mod codec;
pub mod errors;
pub mod merkle;
pub mod phase;
pub mod proof;
pub mod rlp;
pub mod transaction;

pub mod prelude {
    pub use crate::{
        batch::{
            BatchInclusionProof, ChainBatchHeader, ChainInclusionProof, StateRootBatchHeader,
            StateRootBatchProof, TransactionBatchHeader,
        },
        errors::{CodecError, MerkleError, PhaseError},
        phase::TransitionPhase,
        proof::{AccountStateProof, StateDiffProof, StorageStateProof},
        transaction::{OvmTransaction, TransactionBatchProof, TransactionChainElement},
    };
}
