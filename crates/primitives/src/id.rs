use core::fmt::{self, Display, Formatter};
use core::ops::Deref;
use core::str::FromStr;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest identifier accepted at a boundary.
pub const MAX_ID_LEN: usize = 256;

#[derive(Clone, Copy, Debug, Error)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier exceeds {MAX_ID_LEN} bytes")]
    TooLong,
}

fn validate(s: &str) -> Result<(), InvalidId> {
    if s.is_empty() {
        return Err(InvalidId::Empty);
    }
    if s.len() > MAX_ID_LEN {
        return Err(InvalidId::TooLong);
    }
    Ok(())
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
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
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Result<Self, InvalidId> {
                let id = id.into();
                validate(&id)?;
                Ok(Self(id))
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            #[must_use]
            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }
    };
}

id_type!(
    /// Stable identity of a node in the plane.
    ///
    /// Lexicographic order of node ids is the LWW tiebreak, so the inner
    /// representation must stay an ordinary UTF-8 string.
    NodeId
);

id_type!(
    /// Identifier of a snapshot catalog entry.
    SnapshotId
);

id_type!(
    /// Identifier of an image catalog entry.
    ImageId
);

id_type!(
    /// Identifier of the cluster a snapshot was taken from.
    ClusterId
);
