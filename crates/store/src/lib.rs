//! Embedded key-value storage for node-local durable state.
//!
//! The [`Database`] trait is the only surface the rest of the workspace
//! sees; [`RocksDB`] is the production engine and [`InMemoryDB`] mirrors
//! its semantics for tests.

pub mod db;

pub use db::memory::InMemoryDB;
pub use db::rocks::RocksDB;
pub use db::{Column, Database, Operation, StoreError, WriteBatch};
