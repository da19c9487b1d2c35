use core::time::Duration;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use strata_cas::{CasEngine, MemoryBackend, RetryPolicy};
use strata_catalog::Catalog;
use strata_crypto::Keypair;
use strata_ledger::{
    ConsensusDriver, Ledger, LedgerStore, StepTimeouts, Validator, ValidatorHistory, ValidatorSet,
};
use strata_primitives::{ClusterId, NodeId, SnapshotId};
use strata_snapshot::{
    CommitPolicy, SnapshotError, SnapshotPipeline, SourceKv, VolumeSink, VolumeSource,
};
use strata_store::InMemoryDB;
use tempdir::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

struct MemoryKv {
    exported: Vec<u8>,
    restored: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl SourceKv for MemoryKv {
    async fn export(&self) -> io::Result<(u64, Box<dyn AsyncRead + Send + Unpin>)> {
        Ok((
            self.exported.len() as u64,
            Box::new(io::Cursor::new(self.exported.clone())),
        ))
    }

    async fn restore(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> io::Result<()> {
        let mut bytes = Vec::new();
        let _ = reader.read_to_end(&mut bytes).await?;
        *self.restored.lock() = Some(bytes);
        Ok(())
    }
}

struct MemoryVolume {
    archived: Vec<u8>,
    unpacked: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl VolumeSource for MemoryVolume {
    async fn archive(&self) -> io::Result<(u64, Box<dyn AsyncRead + Send + Unpin>)> {
        Ok((
            self.archived.len() as u64,
            Box::new(io::Cursor::new(self.archived.clone())),
        ))
    }
}

#[async_trait]
impl VolumeSink for MemoryVolume {
    async fn unpack(&self, reader: &mut (dyn AsyncRead + Send + Unpin)) -> io::Result<()> {
        let mut bytes = Vec::new();
        let _ = reader.read_to_end(&mut bytes).await?;
        *self.unpacked.lock() = Some(bytes);
        Ok(())
    }
}

struct Fixture {
    pipeline: SnapshotPipeline,
    cancel: CancellationToken,
    _dir: TempDir,
    _in_tx: mpsc::Sender<strata_ledger::ConsensusMsg>,
}

fn fixture() -> Fixture {
    let node = NodeId::new("v0").expect("valid id");
    let keypair = Keypair::random();
    let db = Arc::new(InMemoryDB::new());

    let cas = CasEngine::new(
        Arc::new(MemoryBackend::new()),
        db.clone(),
        64 * 1024,
        RetryPolicy::default(),
    );

    let catalog = Arc::new(RwLock::new(
        Catalog::open(node.clone(), keypair.clone(), db.clone()).expect("catalog opens"),
    ));

    let dir = TempDir::new("strata-snapshot").expect("tempdir should create");
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 path");
    let store =
        LedgerStore::open(path, db, 128, node.clone()).expect("ledger store opens");
    let history = ValidatorHistory::genesis(ValidatorSet::new(
        vec![Validator {
            id: node.clone(),
            public_key: keypair.public(),
        }],
        None,
    ));
    let ledger = Ledger::new(store, history);

    let (in_tx, in_rx) = mpsc::channel(64);
    let (out_tx, _out_rx) = mpsc::channel(64);
    let driver = ConsensusDriver::new(
        ledger.clone(),
        node.clone(),
        keypair.clone(),
        StepTimeouts::default(),
        16,
        in_rx,
        out_tx,
    );
    let cancel = CancellationToken::new();
    drop(tokio::spawn(driver.run(cancel.clone())));

    let pipeline = SnapshotPipeline::new(
        cas,
        catalog,
        ledger,
        keypair,
        node,
        ClusterId::new("cluster-east").expect("valid id"),
    );

    Fixture {
        pipeline,
        cancel,
        _dir: dir,
        _in_tx: in_tx,
    }
}

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut bytes = vec![0; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut bytes);
    bytes
}

#[tokio::test]
async fn test_create_then_restore_round_trip() {
    let fixture = fixture();
    let id = SnapshotId::new("snap-e2e").expect("valid id");

    // Larger than one chunk so the composite spans several.
    let kv = MemoryKv {
        exported: random_bytes(150 * 1024, 1),
        restored: Mutex::new(None),
    };
    let volume = MemoryVolume {
        archived: random_bytes(70 * 1024, 2),
        unpacked: Mutex::new(None),
    };

    let outcome = fixture
        .pipeline
        .create(
            &id,
            &kv,
            &volume,
            CommitPolicy::WaitForCommit {
                timeout: Duration::from_secs(10),
                poll: Duration::from_millis(25),
            },
        )
        .await
        .expect("create should succeed");

    assert_eq!(outcome.committed_height, Some(1));
    assert!(outcome.object.chunk_count() >= 4);

    fixture
        .pipeline
        .restore(&id, &kv, &volume, true)
        .await
        .expect("restore should succeed");

    assert_eq!(kv.restored.lock().as_deref(), Some(&kv.exported[..]));
    assert_eq!(
        volume.unpacked.lock().as_deref(),
        Some(&volume.archived[..])
    );

    fixture.cancel.cancel();
}

#[tokio::test]
async fn test_restore_unknown_snapshot_is_not_found() {
    let fixture = fixture();
    let id = SnapshotId::new("missing").expect("valid id");

    let kv = MemoryKv {
        exported: Vec::new(),
        restored: Mutex::new(None),
    };
    let volume = MemoryVolume {
        archived: Vec::new(),
        unpacked: Mutex::new(None),
    };

    assert!(matches!(
        fixture.pipeline.restore(&id, &kv, &volume, false).await,
        Err(SnapshotError::NotFound(_))
    ));

    fixture.cancel.cancel();
}

#[tokio::test]
async fn test_fire_and_forget_skips_proof_attachment() {
    let fixture = fixture();
    let id = SnapshotId::new("snap-ff").expect("valid id");

    let kv = MemoryKv {
        exported: b"kv state".to_vec(),
        restored: Mutex::new(None),
    };
    let volume = MemoryVolume {
        archived: b"volume".to_vec(),
        unpacked: Mutex::new(None),
    };

    let outcome = fixture
        .pipeline
        .create(&id, &kv, &volume, CommitPolicy::FireAndForget)
        .await
        .expect("create should succeed");
    assert_eq!(outcome.committed_height, None);

    // Proof verification must refuse an entry without an attached proof.
    assert!(matches!(
        fixture.pipeline.restore(&id, &kv, &volume, true).await,
        Err(SnapshotError::ProofRejected(_))
    ));

    // Without verification the bytes still round-trip.
    fixture
        .pipeline
        .restore(&id, &kv, &volume, false)
        .await
        .expect("restore should succeed");
    assert_eq!(kv.restored.lock().as_deref(), Some(&kv.exported[..]));

    fixture.cancel.cancel();
}
