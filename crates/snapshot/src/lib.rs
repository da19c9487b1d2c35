//! The snapshot pipeline.
//!
//! `create` drives a cluster's source KV export and volume archive into
//! one composite payload, places it through the CAS engine, registers the
//! entry in the local catalog, and anchors it into the ledger. `restore`
//! walks the same path backwards, verifying the commit proof and every
//! byte on the way out.

use std::io;

use strata_cas::CasError;
use strata_catalog::CatalogError;
use strata_ledger::LedgerError;
use strata_primitives::SnapshotId;
use thiserror::Error;

pub mod framing;
pub mod pipeline;
pub mod source;

pub use framing::CompositeHeader;
pub use pipeline::{CommitPolicy, SnapshotOutcome, SnapshotPipeline};
pub use source::{SourceKv, VolumeSink, VolumeSource};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SnapshotError {
    /// The catalog has no record yet; the caller retries after
    /// anti-entropy has had a chance to run, or asks a peer.
    #[error("snapshot {0} not known to this node")]
    NotFound(SnapshotId),

    #[error("snapshot metadata is missing required key {0}")]
    MissingMetadata(&'static str),

    #[error("composite payload header is malformed")]
    MalformedHeader,

    #[error("commit proof for snapshot {0} failed verification")]
    ProofRejected(SnapshotId),

    #[error("transaction {0} did not commit within the configured window")]
    CommitTimeout(strata_primitives::Hash),

    #[error(transparent)]
    Cas(#[from] CasError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SnapshotError {
    /// Recovers a [`CasError`] smuggled through an `io::Error` wrapper
    /// (stream adapters erase concrete error types).
    pub(crate) fn from_io(err: io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<CasError>()) {
            #[allow(clippy::unwrap_used, reason = "checked by is::<CasError> above")]
            let inner = err.into_inner().unwrap().downcast::<CasError>().unwrap();
            return Self::Cas(*inner);
        }
        Self::Io(err)
    }

    /// True when the failure is data corruption rather than an
    /// operational condition.
    #[must_use]
    pub fn is_integrity(&self) -> bool {
        match self {
            Self::Cas(err) => err.is_integrity(),
            Self::ProofRejected(_) => true,
            _ => false,
        }
    }
}
