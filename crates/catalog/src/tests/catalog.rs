use strata_store::InMemoryDB;

use super::*;

fn catalog(node: &str) -> Catalog {
    Catalog::open(
        NodeId::new(node).expect("valid id"),
        Keypair::random(),
        Arc::new(InMemoryDB::new()),
    )
    .expect("open should succeed")
}

fn meta(entries: &[(&str, &str)]) -> Metadata {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect()
}

/// Ships every pending delta from `from` into `to`.
fn exchange(from: &mut Catalog, to: &mut Catalog) {
    for delta in from.pending_deltas() {
        let _ = to.apply_delta(&delta).expect("apply should succeed");
    }
}

#[test]
fn test_add_then_query() {
    let mut cat = catalog("n1");

    cat.add_snapshot("snap-1", meta(&[("status", "created")]))
        .expect("add should succeed");

    let record = cat.get_snapshot("snap-1");
    assert!(record.present);
    assert_eq!(record.metadata, Some(meta(&[("status", "created")])));

    // One OR-Set add plus one register write.
    assert_eq!(cat.pending_deltas().len(), 2);
}

#[test]
fn test_listing_is_sorted_and_filterable() {
    let mut cat = catalog("n1");

    for id in ["snap-b", "snap-a", "other-1"] {
        cat.add_snapshot(id, Metadata::new())
            .expect("add should succeed");
    }

    let all: Vec<_> = cat
        .list_snapshots(None)
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(all, vec!["other-1", "snap-a", "snap-b"]);

    let filtered: Vec<_> = cat
        .list_snapshots(Some("snap-"))
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(filtered, vec!["snap-a", "snap-b"]);
}

#[test]
fn test_remove_requires_presence() {
    let mut cat = catalog("n1");

    assert!(matches!(
        cat.remove_snapshot("ghost"),
        Err(CatalogError::NotFound(_))
    ));

    cat.add_snapshot("snap-1", Metadata::new())
        .expect("add should succeed");
    cat.remove_snapshot("snap-1").expect("remove should succeed");

    assert!(!cat.get_snapshot("snap-1").present);
}

#[test]
fn test_concurrent_metadata_update_converges_on_tiebreak() {
    // Both nodes write snap-7 at the same logical instant; n2 wins the
    // lexicographic tiebreak everywhere.
    let mut n1 = catalog("n1");
    let mut n2 = catalog("n2");

    n1.add_snapshot("snap-7", meta(&[("status", "created")]))
        .expect("add should succeed");
    exchange(&mut n1, &mut n2);

    let body = |origin: &Catalog, status: &str| {
        let mut clock = origin.clock().clone();
        let _ = clock.increment(origin.node_id());
        DeltaBody {
            origin: origin.node_id().clone(),
            clock,
            kind: DeltaKind::LwwUpdate,
            scope: Scope::SnapshotMeta,
            entity_id: "snap-7".to_owned(),
            payload: to_borsh_vec(&meta(&[("status", status)])).expect("serializes"),
            timestamp: 100,
        }
    };

    let keypair = Keypair::random();
    let from_n1 = Delta::sign(body(&n1, "completed"), &keypair);
    let from_n2 = Delta::sign(body(&n2, "failed"), &keypair);

    let mut a = catalog("observer-a");
    let mut b = catalog("observer-b");

    assert!(a.apply_delta(&from_n1).expect("apply"));
    assert!(a.apply_delta(&from_n2).expect("apply"));
    assert!(b.apply_delta(&from_n2).expect("apply"));
    assert!(b.apply_delta(&from_n1).expect("apply"));

    for observer in [&a, &b] {
        let record = observer.get_snapshot("snap-7");
        assert_eq!(
            record.metadata.as_ref().and_then(|m| m.get("status")),
            Some(&"failed".to_owned()),
            "n2 > n1 lexicographically"
        );
    }
}

#[test]
fn test_causal_suppression() {
    // n1 emits three register updates; n2 sees them in order 3, 1, 2.
    let mut n1 = catalog("n1");
    n1.add_snapshot("snap-1", meta(&[("v", "0")]))
        .expect("add should succeed");
    n1.update_snapshot_metadata("snap-1", meta(&[("v", "1")]))
        .expect("update should succeed");
    n1.update_snapshot_metadata("snap-1", meta(&[("v", "2")]))
        .expect("update should succeed");

    let deltas = n1.pending_deltas();
    assert_eq!(deltas.len(), 4);
    // Updates to the same register: the last one subsumes the earlier
    // two under LWW.
    let updates: Vec<_> = deltas
        .iter()
        .filter(|d| d.body.kind == DeltaKind::LwwUpdate)
        .cloned()
        .collect();
    assert_eq!(updates.len(), 3);
    let add = deltas
        .iter()
        .find(|d| d.body.kind == DeltaKind::OrSetAdd)
        .cloned()
        .expect("add delta present");

    let mut n2 = catalog("n2");
    assert!(n2.apply_delta(&add).expect("apply"));

    // Last update first: applied, and its clock subsumes the rest.
    assert!(n2.apply_delta(&updates[2]).expect("apply"));
    assert!(!n2.apply_delta(&updates[0]).expect("apply"));
    assert!(!n2.apply_delta(&updates[1]).expect("apply"));

    assert_eq!(
        n2.clock().get(n1.node_id()),
        n1.clock().get(n1.node_id())
    );
    assert_eq!(n2.get_snapshot("snap-1"), n1.get_snapshot("snap-1"));

    // Re-delivery of the oldest delta stays suppressed.
    assert!(!n2.apply_delta(&updates[0]).expect("apply"));
}

#[test]
fn test_apply_is_idempotent() {
    let mut n1 = catalog("n1");
    n1.add_snapshot("snap-1", meta(&[("k", "v")]))
        .expect("add should succeed");

    let mut n2 = catalog("n2");
    let deltas = n1.pending_deltas();

    for delta in &deltas {
        assert!(n2.apply_delta(delta).expect("apply"));
    }
    let converged = n2.get_snapshot("snap-1");
    let root = n2.state_root();

    for delta in &deltas {
        assert!(!n2.apply_delta(delta).expect("apply"));
    }
    assert_eq!(n2.get_snapshot("snap-1"), converged);
    assert_eq!(n2.state_root(), root);
}

#[test]
fn test_kind_scope_mismatch_is_rejected() {
    let mut n1 = catalog("n1");
    let keypair = Keypair::random();

    let mut clock = VectorClock::new();
    let _ = clock.increment(&NodeId::new("evil").expect("valid id"));
    let delta = Delta::sign(
        DeltaBody {
            origin: NodeId::new("evil").expect("valid id"),
            clock,
            kind: DeltaKind::OrSetAdd,
            scope: Scope::SnapshotMeta,
            entity_id: "snap-1".to_owned(),
            payload: Vec::new(),
            timestamp: 1,
        },
        &keypair,
    );

    assert!(matches!(
        n1.apply_delta(&delta),
        Err(CatalogError::KindScopeMismatch { .. })
    ));
    // Rejection leaves no trace in the clock.
    assert_eq!(n1.clock().get(&NodeId::new("evil").expect("valid id")), 0);
}

#[test]
fn test_drain_confirmed_deltas() {
    let mut cat = catalog("n1");
    cat.add_snapshot("snap-1", Metadata::new())
        .expect("add should succeed");
    let confirmed_up_to = cat.clock().clone();

    cat.add_snapshot("snap-2", Metadata::new())
        .expect("add should succeed");
    assert_eq!(cat.pending_deltas().len(), 4);

    cat.drain_confirmed_deltas(&confirmed_up_to)
        .expect("drain should succeed");

    let remaining = cat.pending_deltas();
    assert_eq!(remaining.len(), 2);
    assert!(remaining
        .iter()
        .all(|d| d.body.entity_id == "snap-2"));
}

#[test]
fn test_persistence_survives_reopen() {
    let db = Arc::new(InMemoryDB::new());
    let node = NodeId::new("n1").expect("valid id");
    let keypair = Keypair::random();

    {
        let mut cat = Catalog::open(node.clone(), keypair.clone(), db.clone())
            .expect("open should succeed");
        cat.add_snapshot("snap-1", meta(&[("status", "created")]))
            .expect("add should succeed");
    }

    let cat = Catalog::open(node, keypair, db).expect("reopen should succeed");
    assert!(cat.get_snapshot("snap-1").present);
    assert_eq!(cat.pending_deltas().len(), 2);
}

#[test]
fn test_bundle_merge_converges_both_sides() {
    // n1 holds {a, b, c}; n2 holds {b, c, d}. One bundle exchange each
    // way and both replicas agree, roots included.
    let mut n1 = catalog("n1");
    let mut n2 = catalog("n2");

    for id in ["a", "b", "c"] {
        n1.add_snapshot(id, meta(&[("owner", "n1")]))
            .expect("add should succeed");
    }
    for id in ["b", "c", "d"] {
        n2.add_snapshot(id, meta(&[("owner", "n2")]))
            .expect("add should succeed");
    }
    assert_ne!(n1.state_root(), n2.state_root());

    let bundle_1 = n1.full_bundle().expect("bundle");
    let bundle_2 = n2.full_bundle().expect("bundle");
    n1.merge_bundle(&bundle_2).expect("merge should succeed");
    n2.merge_bundle(&bundle_1).expect("merge should succeed");

    let ids: Vec<_> = n1.list_snapshots(None).into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);
    assert_eq!(n1.list_snapshots(None), n2.list_snapshots(None));
    assert_eq!(n1.state_root(), n2.state_root());
}

#[test]
fn test_delta_exchange_converges_under_reordering_and_duplication() {
    let mut n1 = catalog("n1");
    let mut n2 = catalog("n2");

    n1.add_snapshot("x", meta(&[("from", "n1")]))
        .expect("add should succeed");
    n2.add_snapshot("y", meta(&[("from", "n2")]))
        .expect("add should succeed");
    n2.remove_snapshot("y").expect("remove should succeed");

    // n2's stream arrives reversed: the newest delta subsumes the rest
    // under causal suppression, and the visible state still converges.
    let d1 = n1.pending_deltas();
    let d2 = n2.pending_deltas();

    for delta in d2.iter().rev().chain(d2.iter()) {
        let _ = n1.apply_delta(delta).expect("apply");
    }
    for delta in d1.iter().chain(d1.iter()) {
        let _ = n2.apply_delta(delta).expect("apply");
    }

    assert_eq!(n1.list_snapshots(None), n2.list_snapshots(None));
    assert_eq!(n1.state_root(), n2.state_root());
    assert!(n1.get_snapshot("x").present);
    assert!(!n1.get_snapshot("y").present);
}

#[test]
fn test_state_root_is_canonical() {
    // Same delta set, different receivers, different (FIFO-respecting)
    // interleavings: byte-identical roots. Any metadata change moves the
    // root.
    let mut n1 = catalog("n1");
    let mut n2 = catalog("n2");
    n1.add_snapshot("s-1", meta(&[("k", "v")]))
        .expect("add should succeed");
    n1.add_image("i-1", Metadata::new()).expect("add should succeed");
    n2.add_snapshot("s-2", meta(&[("k", "w")]))
        .expect("add should succeed");

    let d1 = n1.pending_deltas();
    let d2 = n2.pending_deltas();

    let mut first = catalog("observer-1");
    for delta in d1.iter().chain(d2.iter()) {
        let _ = first.apply_delta(delta).expect("apply");
    }

    let mut second = catalog("observer-2");
    for delta in d2.iter().chain(d1.iter()) {
        let _ = second.apply_delta(delta).expect("apply");
    }

    assert_eq!(first.state_root(), second.state_root());
    // Recomputation is stable.
    assert_eq!(first.state_root(), first.state_root());

    let before = first.state_root();
    first
        .apply_delta(&{
            let mut fresh = catalog("n1-prime");
            fresh.add_snapshot("s-3", Metadata::new())
                .expect("add should succeed");
            fresh.pending_deltas()[0].clone()
        })
        .map(|_| ())
        .expect("apply");
    assert_ne!(first.state_root(), before);
}

#[test]
fn test_or_set_re_add_after_remove_via_deltas() {
    // Add x, remove it, add it again; a replica that saw only the first
    // add and the remove converges to x present under the fresh tag.
    let mut n1 = catalog("n1");
    n1.add_snapshot("x", Metadata::new())
        .expect("add should succeed");
    let first_batch = n1.pending_deltas();

    n1.remove_snapshot("x").expect("remove should succeed");
    let with_remove = n1.pending_deltas();
    let remove_delta = with_remove
        .iter()
        .find(|d| d.body.kind == DeltaKind::OrSetRemove)
        .cloned()
        .expect("remove delta present");

    n1.add_snapshot("x", Metadata::new())
        .expect("re-add should succeed");

    let mut replica = catalog("n2");
    for delta in &first_batch {
        let _ = replica.apply_delta(delta).expect("apply");
    }
    let _ = replica.apply_delta(&remove_delta).expect("apply");
    assert!(!replica.get_snapshot("x").present);

    // Full exchange: the re-add wins.
    for delta in n1.pending_deltas() {
        let _ = replica.apply_delta(&delta).expect("apply");
    }
    assert!(replica.get_snapshot("x").present);
    assert_eq!(replica.state_root(), n1.state_root());
}
