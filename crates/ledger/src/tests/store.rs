use std::sync::Arc;

use strata_crypto::Keypair;
use strata_store::InMemoryDB;
use tempdir::TempDir;

use super::*;
use crate::types::{BlockHeader, TxBody, TxKind};

fn node(id: &str) -> NodeId {
    NodeId::new(id).expect("valid id")
}

fn open_store(dir: &TempDir, segment_max_blocks: u64) -> LedgerStore {
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    LedgerStore::open(path, Arc::new(InMemoryDB::new()), segment_max_blocks, node("v0"))
        .expect("open should succeed")
}

fn block_at(height: u64, prev_hash: Hash, txs: Vec<Transaction>) -> Block {
    Block {
        header: BlockHeader {
            height,
            prev_hash,
            merkle_root: Block::compute_tx_root(&txs),
            proposer: node("v0"),
            timestamp: 0,
        },
        transactions: txs,
        commits: Vec::new(),
    }
}

fn tx(keypair: &Keypair, payload: &[u8]) -> Transaction {
    Transaction::sign(
        TxBody {
            kind: TxKind::SnapshotRegister,
            payload: payload.to_vec(),
            origin: node("v0"),
        },
        keypair,
    )
}

#[test]
fn test_genesis_written_on_first_open() {
    let dir = TempDir::new("strata-ledger").expect("tempdir should create");
    let store = open_store(&dir, 4);

    assert_eq!(store.tip(), Some(0));
    let genesis = store.block(0).expect("genesis should read");
    assert_eq!(genesis.header.height, 0);
    assert_eq!(genesis.header.prev_hash, Hash::ZERO);
    assert!(genesis.transactions.is_empty());
}

#[test]
fn test_contiguous_heights_enforced() {
    let dir = TempDir::new("strata-ledger").expect("tempdir should create");
    let mut store = open_store(&dir, 4);
    let genesis_hash = store.block(0).expect("genesis").hash();

    assert!(matches!(
        store.append(&block_at(3, genesis_hash, Vec::new())),
        Err(LedgerError::NonContiguousHeight { got: 3, tip: 0 })
    ));

    store
        .append(&block_at(1, genesis_hash, Vec::new()))
        .expect("append should succeed");
    assert_eq!(store.tip(), Some(1));

    // Heights are never rewritten.
    assert!(store.append(&block_at(1, genesis_hash, Vec::new())).is_err());
}

#[test]
fn test_blocks_span_segments_and_survive_reopen() {
    let dir = TempDir::new("strata-ledger").expect("tempdir should create");
    let keypair = Keypair::random();
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    let db = Arc::new(InMemoryDB::new());

    let prev_hash = {
        let mut store =
            LedgerStore::open(path.clone(), db.clone(), 2, node("v0")).expect("open");
        let mut prev = store.block(0).expect("genesis").hash();
        for height in 1..=5 {
            let block = block_at(height, prev, vec![tx(&keypair, &height.to_le_bytes())]);
            prev = block.hash();
            store.append(&block).expect("append should succeed");
        }
        prev
    };

    // Three segment files for 6 blocks at 2 per segment.
    let segments = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter(|e| {
            e.as_ref()
                .expect("dir entry")
                .file_name()
                .to_string_lossy()
                .starts_with("segment-")
        })
        .count();
    assert_eq!(segments, 3);

    let mut store = LedgerStore::open(path, db, 2, node("v0")).expect("reopen");
    assert_eq!(store.tip(), Some(5));
    for height in 1..=5 {
        let block = store.block(height).expect("block should read");
        assert_eq!(block.header.height, height);
    }

    let next = block_at(6, prev_hash, Vec::new());
    store.append(&next).expect("append after reopen");
}

#[test]
fn test_proof_round_trip() {
    let dir = TempDir::new("strata-ledger").expect("tempdir should create");
    let keypair = Keypair::random();
    let mut store = open_store(&dir, 4);
    let genesis_hash = store.block(0).expect("genesis").hash();

    let txs: Vec<Transaction> = (0..5u8).map(|i| tx(&keypair, &[i])).collect();
    let block = block_at(1, genesis_hash, txs.clone());
    store.append(&block).expect("append should succeed");

    for wanted in &txs {
        let proof = store.proof(&wanted.id()).expect("proof should issue");
        assert_eq!(proof.height, 1);
        assert_eq!(proof.block_hash, block.hash());
        assert!(strata_merkle::verify(
            &block.header.merkle_root,
            &proof.tx_hash,
            &proof.path,
            usize::try_from(proof.index).expect("fits"),
        ));
    }

    let unknown = Hash::digest(b"never committed");
    assert!(matches!(
        store.proof(&unknown),
        Err(LedgerError::TxNotCommitted(_))
    ));
}
