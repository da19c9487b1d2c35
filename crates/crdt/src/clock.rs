use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_primitives::NodeId;

/// Relationship between two vector clocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockOrdering {
    Less,
    Equal,
    Greater,
    /// Neither clock dominates; the caller falls back to a deterministic
    /// tiebreak where one is needed.
    Concurrent,
}

/// Per-node monotonic counters tracking causal history.
///
/// Absent entries read as zero. Entries only grow; nodes that leave the
/// plane keep their slot indefinitely.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(transparent)]
pub struct VectorClock {
    counters: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, node: &NodeId) -> u64 {
        self.counters.get(node).copied().unwrap_or(0)
    }

    /// Advances `node`'s counter and returns the new value.
    pub fn increment(&mut self, node: &NodeId) -> u64 {
        let counter = self.counters.entry(node.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Pointwise maximum with `other`.
    pub fn merge(&mut self, other: &Self) {
        for (node, &counter) in &other.counters {
            let entry = self.counters.entry(node.clone()).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
    }

    #[must_use]
    pub fn compare(&self, other: &Self) -> ClockOrdering {
        let mut less = false;
        let mut greater = false;

        for node in self.counters.keys().chain(other.counters.keys()) {
            let a = self.get(node);
            let b = other.get(node);
            if a < b {
                less = true;
            } else if a > b {
                greater = true;
            }
        }

        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Less,
            (false, true) => ClockOrdering::Greater,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// True when every counter in `self` is at least the counter in
    /// `other`.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        matches!(
            self.compare(other),
            ClockOrdering::Equal | ClockOrdering::Greater
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, u64)> {
        self.counters.iter().map(|(node, &counter)| (node, counter))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}
