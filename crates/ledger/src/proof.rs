use std::collections::BTreeSet;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_merkle::MerkleProof;
use strata_primitives::Hash;

use crate::consensus::{vote_signing_bytes, VoteStep};
use crate::types::{BlockHeader, CommitSig};
use crate::validator::ValidatorSet;

/// Proof that a transaction committed at a specific height.
///
/// Carries everything a verifier needs beyond the block header and the
/// validator set in force at that height: the Merkle path (with the leaf
/// index whose bits encode direction), the block hash, and the precommit
/// signatures gathered at commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CommitProof {
    pub tx_hash: Hash,
    pub block_hash: Hash,
    pub height: u64,
    pub index: u64,
    pub path: MerkleProof,
    pub commits: Vec<CommitSig>,
}

/// Verifies a commit proof against the block header recorded at its
/// height and the validator set in force there.
///
/// Returns `false` on any mismatch: path reconstruction, block hash,
/// height, or a precommit quorum that fails signature checks.
#[must_use]
pub fn verify_proof(
    proof: &CommitProof,
    header: &BlockHeader,
    block_hash: &Hash,
    validators: &ValidatorSet,
) -> bool {
    if proof.height != header.height || proof.block_hash != *block_hash {
        return false;
    }

    let Ok(index) = usize::try_from(proof.index) else {
        return false;
    };
    if !strata_merkle::verify(&header.merkle_root, &proof.tx_hash, &proof.path, index) {
        return false;
    }

    // Count distinct validators with a valid precommit over this block.
    let message = vote_signing_bytes(VoteStep::Precommit, proof.height, Some(proof.block_hash));
    let mut signers = BTreeSet::new();
    for commit in &proof.commits {
        let Some(public) = validators.public_key(&commit.validator) else {
            continue;
        };
        if strata_crypto::verify(public, &message, &commit.signature).is_ok() {
            let _ = signers.insert(&commit.validator);
        }
    }

    signers.len() as u64 >= validators.quorum()
}

#[cfg(test)]
#[path = "tests/proof.rs"]
mod tests;
