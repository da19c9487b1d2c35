use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_primitives::Hash;

/// Canonical record of an immutable stored object.
///
/// The chunk list plus `total_size` fully determine `root`; the root is
/// carried redundantly so readers can verify without refetching chunks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ObjectInfo {
    pub root: Hash,
    pub chunks: Vec<Hash>,
    pub total_size: u64,
    pub chunk_size: u64,
    /// Nanoseconds since the epoch at first store.
    pub created_at: u64,
    pub metadata: BTreeMap<String, String>,
}

impl ObjectInfo {
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}
