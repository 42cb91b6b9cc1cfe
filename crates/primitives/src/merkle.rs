//! Binary merkle tree over batch elements, matching the on-chain `Lib_MerkleTree`.

use alloy_primitives::{keccak256, B256};

use crate::{batch::ChainInclusionProof, errors::MerkleError};

/// Leaf used to pad a batch up to the next power of two: `keccak256(bytes32(0))`.
pub fn default_leaf() -> B256 {
    keccak256([0u8; 32])
}

/// Computes the root of `leaves` and the sibling path for the leaf at `index`.
///
/// Leaves are used as given. Callers hash transaction leaves themselves, while state roots
/// go in raw.
pub fn batch_merkle_proof(
    leaves: &[B256],
    index: usize,
) -> Result<(B256, ChainInclusionProof), MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyTree);
    }
    if index >= leaves.len() {
        return Err(MerkleError::IndexOutOfRange {
            index,
            len: leaves.len(),
        });
    }

    let width = leaves.len().next_power_of_two();
    let mut level = leaves.to_vec();
    level.resize(width, default_leaf());

    let mut siblings = Vec::new();
    let mut pos = index;
    while level.len() > 1 {
        siblings.push(level[pos ^ 1]);
        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
        pos /= 2;
    }

    let proof = ChainInclusionProof {
        index: index as u64,
        siblings,
    };
    Ok((level[0], proof))
}

/// Recomputes the root from a leaf and its inclusion proof.
pub fn compute_root(leaf: B256, proof: &ChainInclusionProof) -> B256 {
    let mut acc = leaf;
    let mut pos = proof.index;
    for sibling in &proof.siblings {
        acc = if pos & 1 == 0 {
            hash_pair(&acc, sibling)
        } else {
            hash_pair(sibling, &acc)
        };
        pos >>= 1;
    }
    acc
}

fn hash_pair(left: &B256, right: &B256) -> B256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_slice());
    buf[32..].copy_from_slice(right.as_slice());
    keccak256(buf)
}
