use borsh::{to_vec as to_borsh_vec, BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_crypto::{verify, Keypair};
use strata_primitives::{Hash, NodeId, PublicKey, Signature};

use crate::SyncError;

macro_rules! signed_message {
    (
        $(#[$meta:meta])*
        $name:ident { $($field:ident: $ty:ty),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(
            Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
        )]
        pub struct $name {
            $(pub $field: $ty,)+
            pub signature: Signature,
        }

        impl $name {
            fn signing_bytes($($field: &$ty),+) -> Vec<u8> {
                to_borsh_vec(&($($field),+,)).expect("message fields serialize")
            }

            /// Checks the envelope signature against `public`.
            pub fn verify(&self, public: &PublicKey) -> Result<(), SyncError> {
                let bytes = Self::signing_bytes($(&self.$field),+);
                verify(public, &bytes, &self.signature).map_err(|_| SyncError::BadSignature)
            }

            pub fn to_wire(&self) -> Vec<u8> {
                to_borsh_vec(self).expect("message serializes")
            }

            pub fn from_wire(bytes: &[u8]) -> Result<Self, SyncError> {
                borsh::from_slice(bytes).map_err(|_| SyncError::Malformed)
            }
        }
    };
}

signed_message!(
    /// Broadcast on the anti-entropy topic every interval.
    RootAnnouncement {
        origin: NodeId,
        root: Hash,
        timestamp: u64,
    }
);

impl RootAnnouncement {
    #[must_use]
    pub fn sign(origin: NodeId, root: Hash, timestamp: u64, keypair: &Keypair) -> Self {
        let signature = keypair.sign(&Self::signing_bytes(&origin, &root, &timestamp));
        Self {
            origin,
            root,
            timestamp,
            signature,
        }
    }
}

signed_message!(
    /// Sent directly to one diverging peer.
    BundleRequest {
        origin: NodeId,
    }
);

impl BundleRequest {
    #[must_use]
    pub fn sign(origin: NodeId, keypair: &Keypair) -> Self {
        let signature = keypair.sign(&Self::signing_bytes(&origin));
        Self { origin, signature }
    }
}

signed_message!(
    /// Direct reply: the full catalog state serialization.
    BundleResponse {
        origin: NodeId,
        bytes: Vec<u8>,
    }
);

impl BundleResponse {
    #[must_use]
    pub fn sign(origin: NodeId, bytes: Vec<u8>, keypair: &Keypair) -> Self {
        let signature = keypair.sign(&Self::signing_bytes(&origin, &bytes));
        Self {
            origin,
            bytes,
            signature,
        }
    }
}
