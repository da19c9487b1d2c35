use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_primitives::NodeId;

/// Last-writer-wins register.
///
/// The write stamp is `(timestamp, node_id)`; merge keeps the larger
/// timestamp and breaks ties by lexicographic node id, so the ordering is
/// total and every replica converges to the same value given the same
/// delta set. Timestamps are logical nanoseconds that never regress at
/// the owning node.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct LwwRegister<T> {
    value: T,
    timestamp: u64,
    node: NodeId,
}

impl<T> LwwRegister<T> {
    #[must_use]
    pub const fn new(value: T, timestamp: u64, node: NodeId) -> Self {
        Self {
            value,
            timestamp,
            node,
        }
    }

    #[must_use]
    pub const fn get(&self) -> &T {
        &self.value
    }

    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[must_use]
    pub const fn node(&self) -> &NodeId {
        &self.node
    }

    /// True when `other`'s stamp beats ours.
    #[must_use]
    pub fn would_update(&self, timestamp: u64, node: &NodeId) -> bool {
        (timestamp, node) > (self.timestamp, &self.node)
    }

    /// Overwrites the register if the stamp wins; returns whether it did.
    pub fn set(&mut self, value: T, timestamp: u64, node: NodeId) -> bool {
        if !self.would_update(timestamp, &node) {
            return false;
        }
        self.value = value;
        self.timestamp = timestamp;
        self.node = node;
        true
    }

    /// Merges another replica's register into this one.
    pub fn merge(&mut self, other: &Self)
    where
        T: Clone,
    {
        if self.would_update(other.timestamp, &other.node) {
            self.value = other.value.clone();
            self.timestamp = other.timestamp;
            self.node = other.node.clone();
        }
    }
}
