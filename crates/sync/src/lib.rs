//! Anti-entropy: Merkle-root divergence detection and repair.
//!
//! Each node periodically announces the canonical root of its catalog
//! state on the anti-entropy topic. A differing root triggers a direct
//! bundle request to that one peer (never a broadcast), and merging the
//! returned full-state bundle converges both sides regardless of which
//! was ahead. Request suppression and a bundle rate cap keep a noisy
//! divergence from turning into a storm.

use thiserror::Error;

pub mod driver;
pub mod messages;

pub use driver::{SyncConfig, SyncDriver};
pub use messages::{BundleRequest, BundleResponse, RootAnnouncement};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("anti-entropy message does not decode")]
    Malformed,
    #[error("anti-entropy message signature does not verify")]
    BadSignature,
    #[error(transparent)]
    Catalog(#[from] strata_catalog::CatalogError),
}
