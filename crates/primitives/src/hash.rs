use core::fmt::{self, Debug, Display, Formatter};
use core::ops::Deref;
use core::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Number of bytes in a digest.
pub const HASH_LEN: usize = 32;

/// A 32-byte SHA-256 digest.
///
/// All identifiers crossing a process boundary are the lowercase hex
/// encoding of one of these.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize, Default,
)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// The all-zero digest, used as the genesis predecessor.
    pub const ZERO: Self = Self([0; HASH_LEN]);

    /// Hashes `data` with SHA-256.
    #[must_use]
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        Self(Sha256::digest(data.as_ref()).into())
    }

    /// Hashes the raw bytes of two digests, `left || right`.
    #[must_use]
    pub fn combine(left: &Self, right: &Self) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(left.0);
        hasher.update(right.0);
        Self(hasher.finalize().into())
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// Parses the lowercase hex form.
    pub fn from_hex(s: &str) -> Result<Self, InvalidHash> {
        if s.len() != HASH_LEN * 2 {
            return Err(InvalidHash::Length(s.len()));
        }
        let mut bytes = [0; HASH_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InvalidHash {
    #[error("expected {} hex chars, got {0}", HASH_LEN * 2)]
    Length(usize),
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
}

impl Deref for Hash {
    type Target = [u8; HASH_LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Self(bytes)
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Debug for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Hash(\"{self}\")")
    }
}

impl FromStr for Hash {
    type Err = InvalidHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <String as Deserialize>::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(SerdeError::custom)
    }
}

#[cfg(test)]
#[path = "tests/hash.rs"]
mod tests;
