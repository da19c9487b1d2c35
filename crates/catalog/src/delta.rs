use std::collections::BTreeMap;

use borsh::{to_vec as to_borsh_vec, BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_crdt::VectorClock;
use strata_crypto::{verify, CryptoError, Keypair};
use strata_primitives::{NodeId, PublicKey, Signature};

/// Free-form entity attributes. `BTreeMap` keeps the canonical byte form
/// independent of insertion order.
pub type Metadata = BTreeMap<String, String>;

/// What a delta does to its target scope.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    OrSetAdd,
    OrSetRemove,
    LwwUpdate,
}

/// Which piece of catalog state a delta targets.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Snapshots,
    Images,
    SnapshotMeta,
    ImageMeta,
}

/// The signed fields of a delta, in canonical wire order.
///
/// Borsh serializes fields in declaration order with no map reordering,
/// so these bytes are what the origin signs and what receivers verify.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct DeltaBody {
    pub origin: NodeId,
    pub clock: VectorClock,
    pub kind: DeltaKind,
    pub scope: Scope,
    pub entity_id: String,
    pub payload: Vec<u8>,
    /// Logical nanoseconds since the epoch at the origin.
    pub timestamp: u64,
}

/// A signed catalog mutation; the only unit of state transported
/// between nodes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Delta {
    #[serde(flatten)]
    pub body: DeltaBody,
    pub signature: Signature,
}

impl Delta {
    /// Signs `body` with the origin's key.
    #[must_use]
    pub fn sign(body: DeltaBody, keypair: &Keypair) -> Self {
        let signature = keypair.sign(&body.signing_bytes());
        Self { body, signature }
    }

    /// Verifies the envelope signature against `public`.
    pub fn verify(&self, public: &PublicKey) -> Result<(), CryptoError> {
        verify(public, &self.body.signing_bytes(), &self.signature)
    }

    #[must_use]
    pub fn encoded_len(&self) -> usize {
        to_borsh_vec(self).map_or(0, |bytes| bytes.len())
    }
}

impl DeltaBody {
    #[must_use]
    pub fn signing_bytes(&self) -> Vec<u8> {
        to_borsh_vec(self).expect("delta body serializes")
    }
}
