use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_crypto::KeyRotation;
use strata_primitives::{NodeId, PublicKey};

/// A consensus participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Validator {
    pub id: NodeId,
    pub public_key: PublicKey,
}

/// The validator set in force at some height range.
///
/// Order is significant: the proposer for `(height, round)` is
/// `validators[(height + round) % n]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ValidatorSet {
    validators: Vec<Validator>,
    quorum: u64,
    /// Highest applied rotation sequence per node.
    rotation_seqs: BTreeMap<NodeId, u64>,
}

impl ValidatorSet {
    /// Builds a set with the given quorum, defaulting to the strict
    /// supermajority `⌊2N/3⌋ + 1`.
    #[must_use]
    pub fn new(validators: Vec<Validator>, quorum: Option<u64>) -> Self {
        let n = validators.len() as u64;
        let quorum = quorum.unwrap_or(2 * n / 3 + 1).min(n.max(1));
        Self {
            validators,
            quorum,
            rotation_seqs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    #[must_use]
    pub const fn quorum(&self) -> u64 {
        self.quorum
    }

    #[must_use]
    pub fn proposer(&self, height: u64, round: u32) -> &Validator {
        let index = (height + u64::from(round)) % self.validators.len() as u64;
        &self.validators[usize::try_from(index).expect("index fits usize")]
    }

    #[must_use]
    pub fn public_key(&self, id: &NodeId) -> Option<&PublicKey> {
        self.validators
            .iter()
            .find(|v| v.id == *id)
            .map(|v| &v.public_key)
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.public_key(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.validators.iter()
    }

    #[must_use]
    pub fn rotation_sequence(&self, id: &NodeId) -> u64 {
        self.rotation_seqs.get(id).copied().unwrap_or(0)
    }

    /// Swaps in the rotated key for whichever validator holds
    /// `rotation.old_public`. Returns `false` when no validator matches
    /// or the sequence does not advance.
    pub fn apply_rotation(&mut self, rotation: &KeyRotation) -> bool {
        let Some(validator) = self
            .validators
            .iter_mut()
            .find(|v| v.public_key == rotation.old_public)
        else {
            return false;
        };

        let current = self
            .rotation_seqs
            .get(&validator.id)
            .copied()
            .unwrap_or(0);
        if rotation.sequence <= current {
            return false;
        }

        validator.public_key = rotation.new_public;
        let id = validator.id.clone();
        let _ = self.rotation_seqs.insert(id, rotation.sequence);
        true
    }
}

/// Validator sets indexed by the height they took effect.
///
/// Proof verification resolves the set *at the proof's height*, never the
/// current one.
#[derive(Clone, Debug, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ValidatorHistory {
    entries: Vec<(u64, ValidatorSet)>,
}

impl ValidatorHistory {
    #[must_use]
    pub fn genesis(set: ValidatorSet) -> Self {
        Self {
            entries: vec![(0, set)],
        }
    }

    /// Records `set` as effective from `height` onward.
    pub fn push(&mut self, height: u64, set: ValidatorSet) {
        debug_assert!(self
            .entries
            .last()
            .map_or(true, |(h, _)| *h <= height));
        self.entries.push((height, set));
    }

    /// The set in force at `height`.
    #[must_use]
    pub fn set_at(&self, height: u64) -> &ValidatorSet {
        let index = self
            .entries
            .partition_point(|(h, _)| *h <= height)
            .saturating_sub(1);
        &self.entries[index].1
    }

    #[must_use]
    pub fn current(&self) -> &ValidatorSet {
        &self.entries[self.entries.len() - 1].1
    }
}

#[cfg(test)]
mod tests {
    use strata_crypto::Keypair;

    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::new(id).expect("valid id")
    }

    fn set_of(n: usize) -> (Vec<Keypair>, ValidatorSet) {
        let keypairs: Vec<Keypair> = (0..n).map(|_| Keypair::random()).collect();
        let validators = keypairs
            .iter()
            .enumerate()
            .map(|(i, kp)| Validator {
                id: node(&format!("v{i}")),
                public_key: kp.public(),
            })
            .collect();
        (keypairs, ValidatorSet::new(validators, None))
    }

    #[test]
    fn test_default_quorum_is_two_thirds_plus_one() {
        assert_eq!(set_of(4).1.quorum(), 3);
        assert_eq!(set_of(7).1.quorum(), 5);
        assert_eq!(set_of(1).1.quorum(), 1);
    }

    #[test]
    fn test_proposer_rotates_round_robin() {
        let (_, set) = set_of(4);

        assert_eq!(set.proposer(1, 0).id, node("v1"));
        assert_eq!(set.proposer(1, 1).id, node("v2"));
        assert_eq!(set.proposer(1, 3).id, node("v0"));
        assert_eq!(set.proposer(2, 0).id, node("v2"));
    }

    #[test]
    fn test_rotation_applies_once_per_sequence() {
        let (keypairs, mut set) = set_of(3);
        let replacement = Keypair::random();

        let rotation = KeyRotation {
            old_public: keypairs[1].public(),
            new_public: replacement.public(),
            sequence: 1,
            reason: "scheduled".to_owned(),
        };

        assert!(set.apply_rotation(&rotation));
        assert_eq!(set.public_key(&node("v1")), Some(&replacement.public()));

        // Replay with the same sequence is refused.
        assert!(!set.apply_rotation(&rotation));
        // Unknown old key is refused.
        let stranger = KeyRotation {
            old_public: Keypair::random().public(),
            new_public: Keypair::random().public(),
            sequence: 9,
            reason: String::new(),
        };
        assert!(!set.apply_rotation(&stranger));
    }

    #[test]
    fn test_history_resolves_set_at_height() {
        let (_, genesis) = set_of(3);
        let (_, later) = set_of(4);

        let mut history = ValidatorHistory::genesis(genesis.clone());
        history.push(10, later.clone());

        assert_eq!(history.set_at(0).len(), 3);
        assert_eq!(history.set_at(9).len(), 3);
        assert_eq!(history.set_at(10).len(), 4);
        assert_eq!(history.set_at(99).len(), 4);
        assert_eq!(history.current().len(), 4);
    }
}
