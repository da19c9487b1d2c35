use std::collections::{BTreeMap, BTreeSet};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_primitives::NodeId;

/// A unique witness for one add operation.
///
/// The counter comes from the adding node's vector-clock slot, which makes
/// tags unique across that node's lifetime.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
pub struct Tag {
    pub node: NodeId,
    pub counter: u64,
}

impl Tag {
    #[must_use]
    pub const fn new(node: NodeId, counter: u64) -> Self {
        Self { node, counter }
    }
}

/// Observed-remove set over ordered elements.
///
/// Remove only covers tags observed at remove time, so a concurrent add
/// survives (add wins). Removed tags become tombstones that are never
/// dropped; a tag that arrives after its tombstone stays dead.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct OrSet<T: Ord> {
    entries: BTreeMap<T, BTreeSet<Tag>>,
    tombstones: BTreeSet<Tag>,
}

impl<T: Ord + Clone> OrSet<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }

    /// Adds `value` witnessed by `tag`.
    ///
    /// Idempotent: re-adding an already-present tag is a no-op, and a tag
    /// that has already been tombstoned stays removed.
    pub fn add(&mut self, value: T, tag: Tag) {
        if self.tombstones.contains(&tag) {
            return;
        }
        let _ = self.entries.entry(value).or_default().insert(tag);
    }

    /// Removes every currently observed tag for `value`, returning them.
    ///
    /// The returned set is what a remove delta carries; an empty set means
    /// the element was not present here.
    pub fn remove(&mut self, value: &T) -> BTreeSet<Tag> {
        let Some(tags) = self.entries.remove(value) else {
            return BTreeSet::new();
        };
        self.tombstones.extend(tags.iter().cloned());
        tags
    }

    /// Applies a remove observed elsewhere: tombstones `tags` and drops
    /// them from `value`'s live set. Tags never seen here still become
    /// tombstones so a late add cannot resurrect them.
    pub fn apply_remove(&mut self, value: &T, tags: &BTreeSet<Tag>) {
        self.tombstones.extend(tags.iter().cloned());

        if let Some(live) = self.entries.get_mut(value) {
            live.retain(|tag| !tags.contains(tag));
            if live.is_empty() {
                let _ = self.entries.remove(value);
            }
        }
    }

    #[must_use]
    pub fn contains(&self, value: &T) -> bool {
        self.entries
            .get(value)
            .is_some_and(|tags| !tags.is_empty())
    }

    /// Live tags witnessing `value`, if any.
    #[must_use]
    pub fn tags(&self, value: &T) -> Option<&BTreeSet<Tag>> {
        self.entries.get(value)
    }

    /// Present elements in ascending order.
    pub fn elements(&self) -> impl Iterator<Item = &T> {
        self.entries.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Joins `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        self.tombstones.extend(other.tombstones.iter().cloned());

        for (value, tags) in &other.entries {
            let live = self.entries.entry(value.clone()).or_default();
            live.extend(tags.iter().cloned());
        }

        // A tombstone from either side kills the tag everywhere.
        let tombstones = &self.tombstones;
        self.entries.retain(|_, tags| {
            tags.retain(|tag| !tombstones.contains(tag));
            !tags.is_empty()
        });
    }
}
