use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use strata_crdt::{LwwRegister, OrSet, VectorClock};

use crate::delta::Metadata;

/// Full catalog state, exchanged during anti-entropy repair.
///
/// Merging a bundle runs every entry through the same OR-Set and LWW
/// semantics as delta application, so either side of a divergence
/// converges no matter which was ahead.
#[derive(Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CatalogBundle {
    pub clock: VectorClock,
    pub snapshots: OrSet<String>,
    pub images: OrSet<String>,
    pub snapshot_meta: BTreeMap<String, LwwRegister<Metadata>>,
    pub image_meta: BTreeMap<String, LwwRegister<Metadata>>,
}
