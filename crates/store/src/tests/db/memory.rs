use super::*;
use crate::db::WriteBatch;

#[test]
fn test_put_get_delete() {
    let db = InMemoryDB::new();

    for b1 in 0..10u8 {
        for b2 in 0..10u8 {
            let bytes = [b1, b2];

            db.put(Column::Generic, &bytes, &bytes)
                .expect("put should succeed");

            assert!(db
                .has(Column::Generic, &bytes)
                .expect("has should succeed"));
            assert_eq!(
                db.get(Column::Generic, &bytes)
                    .expect("get should succeed")
                    .expect("key should exist"),
                bytes
            );
        }
    }

    assert_eq!(
        None,
        db.get(Column::Generic, &[]).expect("get should succeed")
    );

    db.delete(Column::Generic, &[0, 0])
        .expect("delete should succeed");
    assert!(!db
        .has(Column::Generic, &[0, 0])
        .expect("has should succeed"));
}

#[test]
fn test_columns_are_disjoint() {
    let db = InMemoryDB::new();

    db.put(Column::Catalog, b"key", b"catalog")
        .expect("put should succeed");
    db.put(Column::Ledger, b"key", b"ledger")
        .expect("put should succeed");

    assert_eq!(
        db.get(Column::Catalog, b"key")
            .expect("get should succeed")
            .expect("key should exist"),
        b"catalog"
    );
    assert_eq!(
        db.get(Column::Ledger, b"key")
            .expect("get should succeed")
            .expect("key should exist"),
        b"ledger"
    );
    assert!(!db
        .has(Column::Generic, b"key")
        .expect("has should succeed"));
}

#[test]
fn test_iter_prefix_is_sorted_and_bounded() {
    let db = InMemoryDB::new();

    for key in [&b"aa/1"[..], b"aa/2", b"ab/1", b"b/1"] {
        db.put(Column::Generic, key, key).expect("put should succeed");
    }

    let entries = db
        .iter_prefix(Column::Generic, b"aa/")
        .expect("iter should succeed");

    assert_eq!(
        entries
            .iter()
            .map(|(k, _)| k.as_slice())
            .collect::<Vec<_>>(),
        vec![&b"aa/1"[..], b"aa/2"]
    );
}

#[test]
fn test_write_batch_applies_in_order() {
    let db = InMemoryDB::new();

    let mut batch = WriteBatch::new();
    batch.put(Column::Generic, &b"k"[..], &b"first"[..]);
    batch.put(Column::Generic, &b"k"[..], &b"second"[..]);
    batch.delete(Column::Generic, &b"gone"[..]);
    db.write(batch).expect("write should succeed");

    assert_eq!(
        db.get(Column::Generic, b"k")
            .expect("get should succeed")
            .expect("key should exist"),
        b"second"
    );
}
