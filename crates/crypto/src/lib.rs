//! Ed25519 signing for deltas, transactions and consensus votes.
//!
//! Every signature in the plane is detached and computed over a canonical
//! byte serialization with fixed field order; verification is mandatory
//! before any signed payload is applied.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use strata_primitives::{PublicKey, Signature};
use thiserror::Error;

pub mod keystore;
pub mod rotation;

pub use keystore::Keystore;
pub use rotation::KeyRotation;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CryptoError {
    #[error("public key bytes do not form a valid curve point")]
    MalformedPublicKey,
    #[error("signature verification failed")]
    BadSignature,
}

/// A node's Ed25519 signing identity.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public())
            .finish_non_exhaustive()
    }
}

impl Keypair {
    #[must_use]
    pub fn generate(csprng: &mut (impl RngCore + CryptoRng)) -> Self {
        Self {
            signing: SigningKey::generate(csprng),
        }
    }

    /// Generates a keypair from the OS entropy source.
    #[must_use]
    pub fn random() -> Self {
        Self::generate(&mut OsRng)
    }

    #[must_use]
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&bytes),
        }
    }

    #[must_use]
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    #[must_use]
    pub fn public(&self) -> PublicKey {
        PublicKey::from_bytes(self.signing.verifying_key().to_bytes())
    }

    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.signing.sign(message).to_bytes())
    }
}

/// Verifies `signature` over `message` against `public`.
pub fn verify(public: &PublicKey, message: &[u8], signature: &Signature) -> Result<(), CryptoError> {
    let key = VerifyingKey::from_bytes(public.as_bytes())
        .map_err(|_| CryptoError::MalformedPublicKey)?;
    let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());

    key.verify(message, &signature)
        .map_err(|_| CryptoError::BadSignature)
}
