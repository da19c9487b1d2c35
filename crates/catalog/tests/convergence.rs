//! Multi-replica convergence: any delivery order, duplication included,
//! ends with identical catalog state on every node.

use std::sync::Arc;

use strata_catalog::{Catalog, Delta, Metadata};
use strata_crypto::Keypair;
use strata_primitives::NodeId;
use strata_store::InMemoryDB;

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

/// Deterministic interleaving of several origins' delta streams.
///
/// Cross-origin order is arbitrary; within one origin the stream stays
/// FIFO, which is what the gossip layer guarantees per peer.
fn interleave(streams: &[Vec<Delta>], seed: u64) -> Vec<Delta> {
    let mut cursors: Vec<usize> = vec![0; streams.len()];
    let mut out = Vec::new();
    let mut state = seed;

    loop {
        let open: Vec<usize> = streams
            .iter()
            .enumerate()
            .filter(|(i, stream)| cursors[*i] < stream.len())
            .map(|(i, _)| i)
            .collect();
        if open.is_empty() {
            return out;
        }

        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        let pick = open[usize::try_from(state % open.len() as u64).expect("fits")];
        out.push(streams[pick][cursors[pick]].clone());
        cursors[pick] += 1;
    }
}

fn apply_all(target: &mut Catalog, deltas: &[Delta]) {
    for delta in deltas {
        let _ = target.apply_delta(delta).expect("apply should succeed");
    }
}

#[test]
fn test_three_replicas_converge_under_shuffled_duplicated_delivery() {
    let mut a = catalog("node-a");
    let mut b = catalog("node-b");
    let mut c = catalog("node-c");

    // Independent histories with overlap and churn.
    a.add_snapshot("s-shared", meta(&[("owner", "a"), ("status", "created")]))
        .expect("add");
    a.add_snapshot("s-only-a", meta(&[("owner", "a")])).expect("add");
    a.update_snapshot_metadata("s-shared", meta(&[("owner", "a"), ("status", "sealed")]))
        .expect("update");

    b.add_snapshot("s-shared", meta(&[("owner", "b")])).expect("add");
    b.add_snapshot("s-churn", Metadata::new()).expect("add");
    b.remove_snapshot("s-churn").expect("remove");
    b.add_snapshot("s-churn", meta(&[("attempt", "2")])).expect("re-add");
    b.add_image("img-1", meta(&[("arch", "amd64")])).expect("add");

    c.add_image("img-1", meta(&[("arch", "arm64")])).expect("add");
    c.add_snapshot("s-only-c", Metadata::new()).expect("add");

    let from_a = a.pending_deltas();
    let from_b = b.pending_deltas();
    let from_c = c.pending_deltas();

    // Everyone receives everyone else's streams, interleaved differently
    // per receiver, with one stream redelivered in full as duplicates.
    let mut inbound_a = interleave(&[from_b.clone(), from_c.clone()], 1);
    inbound_a.extend(from_b.iter().cloned());
    apply_all(&mut a, &inbound_a);

    let mut inbound_b = interleave(&[from_c.clone(), from_a.clone()], 2);
    inbound_b.extend(from_c.iter().cloned());
    apply_all(&mut b, &inbound_b);

    let inbound_c = interleave(&[from_a, from_b], 3);
    apply_all(&mut c, &inbound_c);

    // Same elements, same registers, same canonical root everywhere.
    assert_eq!(a.list_snapshots(None), b.list_snapshots(None));
    assert_eq!(b.list_snapshots(None), c.list_snapshots(None));
    assert_eq!(a.list_images(None), b.list_images(None));
    assert_eq!(b.list_images(None), c.list_images(None));

    assert_eq!(a.state_root(), b.state_root());
    assert_eq!(b.state_root(), c.state_root());

    // Churn resolved as present (the re-add's fresh tag wins).
    assert!(a.get_snapshot("s-churn").present);
    // The image register resolved one way on all replicas.
    let arch = a.get_image("img-1").metadata.expect("metadata present");
    assert_eq!(arch, b.get_image("img-1").metadata.expect("metadata present"));
    assert_eq!(arch, c.get_image("img-1").metadata.expect("metadata present"));
}

#[test]
fn test_bundle_exchange_repairs_after_partition() {
    // a and b diverge while partitioned; a single bundle exchange in each
    // direction reconciles them.
    let mut a = catalog("node-a");
    let mut b = catalog("node-b");

    for id in ["p-1", "p-2"] {
        a.add_snapshot(id, meta(&[("side", "a")])).expect("add");
    }
    for id in ["p-2", "p-3"] {
        b.add_snapshot(id, meta(&[("side", "b")])).expect("add");
    }
    b.remove_snapshot("p-3").expect("remove");

    assert_ne!(a.state_root(), b.state_root());

    let bundle_a = a.full_bundle().expect("bundle");
    let bundle_b = b.full_bundle().expect("bundle");
    a.merge_bundle(&bundle_b).expect("merge");
    b.merge_bundle(&bundle_a).expect("merge");

    assert_eq!(a.state_root(), b.state_root());
    assert_eq!(a.list_snapshots(None), b.list_snapshots(None));
    assert!(!a.get_snapshot("p-3").present);
}
