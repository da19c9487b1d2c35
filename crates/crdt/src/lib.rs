//! Conflict-free replicated primitives for the catalog.
//!
//! Three pieces compose the catalog state: a [`VectorClock`] for causal
//! ordering of deltas, an observed-remove set ([`OrSet`]) for entity
//! membership, and a last-writer-wins register ([`LwwRegister`]) for
//! per-entity metadata. All three merge commutatively, associatively and
//! idempotently, so replicas converge regardless of delivery order.

pub mod clock;
pub mod lww;
pub mod orset;

pub use clock::{ClockOrdering, VectorClock};
pub use lww::LwwRegister;
pub use orset::{OrSet, Tag};
