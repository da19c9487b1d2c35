//! Binary Merkle trees over 32-byte digests.
//!
//! Construction pairs leaves bottom-up; an odd node at any level is
//! combined with itself. Parents hash the raw bytes of the two child
//! digests, never the hex form. Proof paths store sibling digests from
//! leaf level to root; the side the running hash sits on at each level is
//! given by the corresponding bit of the leaf index.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_primitives::Hash;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MerkleError {
    #[error("cannot build a tree over zero leaves")]
    EmptyLeaves,
    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Sibling digests from the leaf level up to (but excluding) the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct MerkleProof {
    pub path: Vec<Hash>,
}

impl MerkleProof {
    #[must_use]
    pub fn len(&self) -> usize {
        self.path.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

fn next_level(level: &[Hash]) -> Vec<Hash> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    for pair in level.chunks(2) {
        let left = &pair[0];
        // Odd width: the last node pairs with itself.
        let right = pair.get(1).unwrap_or(left);
        next.push(Hash::combine(left, right));
    }
    next
}

/// Computes the root over `leaves`.
///
/// A single leaf is its own root. Zero leaves is an error: callers must
/// not request a tree over nothing.
pub fn build_root(leaves: &[Hash]) -> Result<Hash, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyLeaves);
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    Ok(level[0])
}

/// Builds the inclusion proof for `leaves[index]`.
pub fn prove(leaves: &[Hash], index: usize) -> Result<MerkleProof, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyLeaves);
    }
    if index >= leaves.len() {
        return Err(MerkleError::IndexOutOfRange {
            index,
            len: leaves.len(),
        });
    }

    let mut path = Vec::new();
    let mut level = leaves.to_vec();
    let mut idx = index;

    while level.len() > 1 {
        let sibling = if idx % 2 == 0 {
            // Right sibling, or self when the level is odd-width.
            *level.get(idx + 1).unwrap_or(&level[idx])
        } else {
            level[idx - 1]
        };
        path.push(sibling);

        level = next_level(&level);
        idx /= 2;
    }

    Ok(MerkleProof { path })
}

/// Checks that `leaf` hashes up `proof` to `root` from position `index`.
///
/// Returns `false` on any mismatch; the caller decides whether to retry
/// or escalate.
#[must_use]
pub fn verify(root: &Hash, leaf: &Hash, proof: &MerkleProof, index: usize) -> bool {
    let mut acc = *leaf;
    let mut idx = index;

    for sibling in &proof.path {
        acc = if idx % 2 == 0 {
            Hash::combine(&acc, sibling)
        } else {
            Hash::combine(sibling, &acc)
        };
        idx /= 2;
    }

    acc == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n).map(|i| Hash::digest(i.to_le_bytes())).collect()
    }

    #[test]
    fn test_empty_leaves_is_an_error() {
        assert!(matches!(build_root(&[]), Err(MerkleError::EmptyLeaves)));
        assert!(matches!(prove(&[], 0), Err(MerkleError::EmptyLeaves)));
    }

    #[test]
    fn test_single_leaf_root_is_the_leaf() {
        let leaf = Hash::digest(b"only");

        assert_eq!(build_root(&[leaf]).expect("non-empty"), leaf);

        let proof = prove(&[leaf], 0).expect("non-empty");
        assert!(proof.is_empty());
        assert!(verify(&leaf, &leaf, &proof, 0));
    }

    #[test]
    fn test_two_leaves() {
        let l = leaves(2);
        let root = build_root(&l).expect("non-empty");

        assert_eq!(root, Hash::combine(&l[0], &l[1]));
    }

    #[test]
    fn test_odd_width_duplicates_last_leaf() {
        let l = leaves(3);
        let root = build_root(&l).expect("non-empty");

        let ab = Hash::combine(&l[0], &l[1]);
        let cc = Hash::combine(&l[2], &l[2]);
        assert_eq!(root, Hash::combine(&ab, &cc));

        // The duplicated leaf proves against itself as its own sibling.
        let proof = prove(&l, 2).expect("in range");
        assert_eq!(proof.path, vec![l[2], ab]);
        assert!(verify(&root, &l[2], &proof, 2));
    }

    #[test]
    fn test_all_indices_prove_and_verify() {
        for n in 1..=17 {
            let l = leaves(n);
            let root = build_root(&l).expect("non-empty");

            for (i, leaf) in l.iter().enumerate() {
                let proof = prove(&l, i).expect("in range");
                assert!(verify(&root, leaf, &proof, i), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let l = leaves(8);
        let root = build_root(&l).expect("non-empty");
        let proof = prove(&l, 3).expect("in range");

        assert!(verify(&root, &l[3], &proof, 3));

        // Wrong leaf.
        assert!(!verify(&root, &l[4], &proof, 3));
        // Wrong index.
        assert!(!verify(&root, &l[3], &proof, 2));
        // Mutated path element.
        let mut bad = proof.clone();
        bad.path[1] = Hash::digest(b"tampered");
        assert!(!verify(&root, &l[3], &bad, 3));
        // Truncated path.
        let mut short = proof;
        let _ = short.path.pop();
        assert!(!verify(&root, &l[3], &short, 3));
    }

    #[test]
    fn test_index_out_of_range() {
        let l = leaves(4);
        assert!(matches!(
            prove(&l, 4),
            Err(MerkleError::IndexOutOfRange { index: 4, len: 4 })
        ));
    }
}
