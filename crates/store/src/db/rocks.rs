use camino::Utf8Path;
use rocksdb::{ColumnFamilyDescriptor, Options, WriteBatch as RocksWriteBatch, DB};
use strum::IntoEnumIterator;

use super::memory::column_name;
use super::{Column, Database, Operation, StoreError, WriteBatch};

/// The production storage engine.
#[derive(Debug)]
pub struct RocksDB {
    db: DB,
}

impl RocksDB {
    /// Opens (or creates) the database at `path` with every [`Column`]
    /// family present.
    pub fn open(path: &Utf8Path) -> Result<Self, StoreError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let descriptors = Column::iter()
            .map(|column| ColumnFamilyDescriptor::new(column_name(column), Options::default()));

        let db = DB::open_cf_descriptors(&options, path.as_std_path(), descriptors)
            .map_err(|err| StoreError::Engine(err.to_string()))?;

        Ok(Self { db })
    }

    fn cf(&self, column: Column) -> Result<&rocksdb::ColumnFamily, StoreError> {
        self.db
            .cf_handle(column_name(column))
            .ok_or(StoreError::MissingColumn(column))
    }
}

impl Database for RocksDB {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get_cf(self.cf(column)?, key)
            .map_err(|err| StoreError::Engine(err.to_string()))
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.db
            .put_cf(self.cf(column)?, key, value)
            .map_err(|err| StoreError::Engine(err.to_string()))
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.db
            .delete_cf(self.cf(column)?, key)
            .map_err(|err| StoreError::Engine(err.to_string()))
    }

    fn iter_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let cf = self.cf(column)?;
        let mut entries = Vec::new();

        for item in self.db.prefix_iterator_cf(cf, prefix) {
            let (key, value) = item.map_err(|err| StoreError::Engine(err.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }

        Ok(entries)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut rocks_batch = RocksWriteBatch::default();

        for op in batch.operations() {
            match op {
                Operation::Put { column, key, value } => {
                    rocks_batch.put_cf(self.cf(*column)?, key, value);
                }
                Operation::Delete { column, key } => {
                    rocks_batch.delete_cf(self.cf(*column)?, key);
                }
            }
        }

        self.db
            .write(rocks_batch)
            .map_err(|err| StoreError::Engine(err.to_string()))
    }
}

#[cfg(test)]
#[path = "../tests/db/rocks.rs"]
mod tests;
