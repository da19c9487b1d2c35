//! The replicated metadata catalog.
//!
//! Entity membership lives in OR-Sets, per-entity metadata in LWW
//! registers, and every local mutation is captured as a signed, vector-
//! clock-tagged [`Delta`], the only unit of state that moves between
//! nodes. Receiving sides apply deltas idempotently under the causal
//! admission rule, so replicas converge no matter how the network
//! reorders or duplicates traffic.

use strata_store::StoreError;
use thiserror::Error;

pub mod bundle;
pub mod catalog;
pub mod delta;

pub use bundle::CatalogBundle;
pub use catalog::{Catalog, EntityRecord};
pub use delta::{Delta, DeltaKind, Metadata, Scope};

/// The catalog behind its single-writer lock, as shared across tasks.
/// Mutations take the write half; queries clone records out of the read
/// half without holding it across suspension points.
pub type SharedCatalog = std::sync::Arc<tokio::sync::RwLock<Catalog>>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("entity {0} not found in scope")]
    NotFound(String),

    #[error("delta payload does not decode for kind/scope {kind:?}/{scope:?}")]
    MalformedPayload {
        kind: delta::DeltaKind,
        scope: delta::Scope,
    },

    #[error("kind {kind:?} is not valid for scope {scope:?}")]
    KindScopeMismatch {
        kind: delta::DeltaKind,
        scope: delta::Scope,
    },

    #[error("persisted catalog state is malformed at key {0}")]
    CorruptState(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
