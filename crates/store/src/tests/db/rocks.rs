use camino::Utf8PathBuf;
use tempdir::TempDir;

use super::*;
use crate::db::WriteBatch;

fn scratch() -> (TempDir, RocksDB) {
    let dir = TempDir::new("strata-store").expect("tempdir should create");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    let db = RocksDB::open(&path).expect("open should succeed");
    (dir, db)
}

#[test]
fn test_round_trip_across_columns() {
    let (_dir, db) = scratch();

    db.put(Column::CasCache, b"chunk", b"bytes")
        .expect("put should succeed");
    db.put(Column::Catalog, b"chunk", b"state")
        .expect("put should succeed");

    assert_eq!(
        db.get(Column::CasCache, b"chunk")
            .expect("get should succeed")
            .expect("key should exist"),
        b"bytes"
    );
    assert!(!db
        .has(Column::Ledger, b"chunk")
        .expect("has should succeed"));

    db.delete(Column::CasCache, b"chunk")
        .expect("delete should succeed");
    assert!(!db
        .has(Column::CasCache, b"chunk")
        .expect("has should succeed"));
}

#[test]
fn test_iter_prefix() {
    let (_dir, db) = scratch();

    for key in [&b"obj/a"[..], b"obj/b", b"other"] {
        db.put(Column::CasObjects, key, b"v")
            .expect("put should succeed");
    }

    let entries = db
        .iter_prefix(Column::CasObjects, b"obj/")
        .expect("iter should succeed");

    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|(k, _)| k.starts_with(b"obj/")));
}

#[test]
fn test_batch_is_atomic_across_columns() {
    let (_dir, db) = scratch();

    let mut batch = WriteBatch::new();
    batch.put(Column::Catalog, &b"vc"[..], &b"clock"[..]);
    batch.put(Column::Ledger, &b"height"[..], &b"0"[..]);
    db.write(batch).expect("write should succeed");

    assert!(db.has(Column::Catalog, b"vc").expect("has should succeed"));
    assert!(db
        .has(Column::Ledger, b"height")
        .expect("has should succeed"));
}

#[test]
fn test_reopen_preserves_state() {
    let dir = TempDir::new("strata-store").expect("tempdir should create");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");

    {
        let db = RocksDB::open(&path).expect("open should succeed");
        db.put(Column::Generic, b"persisted", b"yes")
            .expect("put should succeed");
    }

    let db = RocksDB::open(&path).expect("reopen should succeed");
    assert_eq!(
        db.get(Column::Generic, b"persisted")
            .expect("get should succeed")
            .expect("key should exist"),
        b"yes"
    );
}
