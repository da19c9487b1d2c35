use std::collections::BTreeMap;

use parking_lot::RwLock;
use strum::IntoEnumIterator;

use super::{Column, Database, Operation, StoreError, WriteBatch};

type ColumnMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// A [`Database`] over in-process `BTreeMap`s.
///
/// Matches the RocksDB engine's observable semantics, including atomic
/// batches, so tests can swap it in freely.
#[derive(Debug, Default)]
pub struct InMemoryDB {
    columns: RwLock<BTreeMap<&'static str, ColumnMap>>,
}

impl InMemoryDB {
    #[must_use]
    pub fn new() -> Self {
        let mut columns = BTreeMap::new();
        for column in Column::iter() {
            let _ = columns.insert(column_name(column), ColumnMap::new());
        }
        Self {
            columns: RwLock::new(columns),
        }
    }
}

pub(crate) fn column_name(column: Column) -> &'static str {
    match column {
        Column::Catalog => "catalog",
        Column::CasCache => "cas_cache",
        Column::CasObjects => "cas_objects",
        Column::Ledger => "ledger",
        Column::Generic => "generic",
    }
}

impl Database for InMemoryDB {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let columns = self.columns.read();
        let map = columns
            .get(column_name(column))
            .ok_or(StoreError::MissingColumn(column))?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut columns = self.columns.write();
        let map = columns
            .get_mut(column_name(column))
            .ok_or(StoreError::MissingColumn(column))?;
        let _ = map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        let mut columns = self.columns.write();
        let map = columns
            .get_mut(column_name(column))
            .ok_or(StoreError::MissingColumn(column))?;
        let _ = map.remove(key);
        Ok(())
    }

    fn iter_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let columns = self.columns.read();
        let map = columns
            .get(column_name(column))
            .ok_or(StoreError::MissingColumn(column))?;
        Ok(map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut columns = self.columns.write();
        for op in batch.operations() {
            let column = match op {
                Operation::Put { column, .. } | Operation::Delete { column, .. } => *column,
            };
            if !columns.contains_key(column_name(column)) {
                return Err(StoreError::MissingColumn(column));
            }
        }
        for op in batch.operations() {
            match op {
                Operation::Put { column, key, value } => {
                    let map = columns
                        .get_mut(column_name(*column))
                        .ok_or(StoreError::MissingColumn(*column))?;
                    let _ = map.insert(key.clone(), value.clone());
                }
                Operation::Delete { column, key } => {
                    let map = columns
                        .get_mut(column_name(*column))
                        .ok_or(StoreError::MissingColumn(*column))?;
                    let _ = map.remove(key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/db/memory.rs"]
mod tests;
