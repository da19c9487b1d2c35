use strum::{AsRefStr, EnumIter};
use thiserror::Error;

pub mod memory;
pub mod rocks;

/// Column families partitioning node-local state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, AsRefStr, EnumIter)]
pub enum Column {
    /// Catalog CRDT state: vector clock, sets, registers, outgoing queue.
    Catalog,
    /// Local content-addressed chunk cache.
    CasCache,
    /// Object metadata records known to this node.
    CasObjects,
    /// Ledger height and transaction indices.
    Ledger,
    /// Anything that doesn't warrant its own family.
    Generic,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("storage engine error: {0}")]
    Engine(String),
    #[error("column {0:?} is missing from the database")]
    MissingColumn(Column),
}

/// A single mutation inside a [`WriteBatch`].
#[derive(Clone, Debug)]
pub enum Operation {
    Put {
        column: Column,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        column: Column,
        key: Vec<u8>,
    },
}

/// An ordered group of mutations applied atomically.
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    ops: Vec<Operation>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, column: Column, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(Operation::Put {
            column,
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, column: Column, key: impl Into<Vec<u8>>) {
        self.ops.push(Operation::Delete {
            column,
            key: key.into(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }
}

/// Minimal synchronous KV interface shared by all engines.
///
/// Engines are internally synchronized; calls from concurrent tasks are
/// safe without external locking.
pub trait Database: Send + Sync {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError>;

    fn has(&self, column: Column, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(column, key)?.is_some())
    }

    /// Returns every `(key, value)` pair whose key starts with `prefix`,
    /// in ascending key order.
    fn iter_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Applies `batch` atomically: either every operation lands or none.
    fn write(&self, batch: WriteBatch) -> Result<(), StoreError>;
}
