//! Content-addressed storage over a pluggable blob backend.
//!
//! Byte streams are chunked at a fixed per-namespace size, each chunk is
//! addressed by its SHA-256 digest, and objects record the ordered chunk
//! list plus the Merkle root over those digests. Placement deduplicates
//! by stat-before-put; retrieval verifies every chunk and the reassembled
//! root before releasing bytes. A durable local cache fronts the backend
//! but is never trusted without re-verification.

use strata_primitives::Hash;
use strata_store::StoreError;
use thiserror::Error;

pub mod backend;
pub mod engine;
pub mod key;
pub mod object;
pub mod retry;

pub use backend::{BackendError, BlobBackend, FsBackend, MemoryBackend};
pub use engine::CasEngine;
pub use object::ObjectInfo;
pub use retry::RetryPolicy;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CasError {
    /// Chunk bytes did not hash to their address. Corruption, never
    /// retried.
    #[error("chunk integrity failure: expected {expected}, got {actual}")]
    ChunkIntegrity { expected: Hash, actual: Hash },

    /// Reassembled object root did not match the requested root.
    #[error("object root mismatch: expected {expected}, got {actual}")]
    RootMismatch { expected: Hash, actual: Hash },

    #[error("object {0} not found")]
    ObjectNotFound(Hash),

    #[error("refusing to store a zero-byte object")]
    EmptyObject,

    #[error("object record for {0} is malformed")]
    MalformedObject(Hash),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CasError {
    /// Integrity failures are reported as corruption and must never be
    /// absorbed by retry loops.
    #[must_use]
    pub const fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::ChunkIntegrity { .. } | Self::RootMismatch { .. }
        )
    }
}
