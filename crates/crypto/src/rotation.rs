use borsh::{to_vec as to_borsh_vec, BorshDeserialize, BorshSerialize};
use strata_primitives::{PublicKey, Signature};

use crate::{verify, CryptoError, Keypair};

/// A request to replace a node's signing key.
///
/// Carried as a ledger transaction payload; takes effect only at the
/// height its transaction commits. The sequence number is strictly
/// monotonic per node, so replayed or stale rotations are rejected by
/// admission.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct KeyRotation {
    pub old_public: PublicKey,
    pub new_public: PublicKey,
    pub sequence: u64,
    pub reason: String,
}

impl KeyRotation {
    /// Canonical bytes the old key signs over.
    pub fn signing_bytes(&self) -> Vec<u8> {
        to_borsh_vec(self).expect("borsh serialization of plain fields cannot fail")
    }

    /// Signs the rotation with the outgoing key.
    #[must_use]
    pub fn sign(&self, old_keypair: &Keypair) -> Signature {
        old_keypair.sign(&self.signing_bytes())
    }

    /// Checks the rotation was authorized by the key being replaced.
    pub fn verify(&self, signature: &Signature) -> Result<(), CryptoError> {
        verify(&self.old_public, &self.signing_bytes(), signature)
    }
}
