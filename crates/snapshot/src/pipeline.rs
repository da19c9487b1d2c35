use core::time::Duration;
use std::io;
use std::time::Instant;

use borsh::to_vec as to_borsh_vec;
use futures_util::StreamExt;
use strata_cas::{CasEngine, ObjectInfo};
use strata_catalog::{Metadata, SharedCatalog};
use strata_crypto::Keypair;
use strata_ledger::{CommitProof, Ledger, SnapshotRegister, Transaction, TxBody, TxKind};
use strata_primitives::{ClusterId, Hash, NodeId, SnapshotId};
use tokio::io::{AsyncReadExt, copy, sink};
use tokio_util::io::StreamReader;
use tracing::{info, warn};

use crate::framing::CompositeHeader;
use crate::source::{SourceKv, VolumeSink, VolumeSource};
use crate::SnapshotError;

/// Whether `create` blocks on ledger finality.
#[derive(Clone, Copy, Debug)]
pub enum CommitPolicy {
    /// Poll for the commit proof and attach it to the catalog entry
    /// before returning.
    WaitForCommit { timeout: Duration, poll: Duration },
    /// Submit the transaction and return; callers poll the proof
    /// endpoint themselves.
    FireAndForget,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self::WaitForCommit {
            timeout: Duration::from_secs(30),
            poll: Duration::from_millis(250),
        }
    }
}

/// What `create` produced.
#[derive(Clone, Debug)]
pub struct SnapshotOutcome {
    pub object: ObjectInfo,
    pub tx_hash: Hash,
    pub committed_height: Option<u64>,
}

/// Drives snapshots end to end: source KV + volume → CAS → catalog →
/// ledger, and back out again on restore.
pub struct SnapshotPipeline {
    cas: CasEngine,
    catalog: SharedCatalog,
    ledger: Ledger,
    keypair: Keypair,
    node: NodeId,
    cluster: ClusterId,
}

impl std::fmt::Debug for SnapshotPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotPipeline")
            .field("node", &self.node)
            .field("cluster", &self.cluster)
            .finish_non_exhaustive()
    }
}

impl SnapshotPipeline {
    #[must_use]
    pub fn new(
        cas: CasEngine,
        catalog: SharedCatalog,
        ledger: Ledger,
        keypair: Keypair,
        node: NodeId,
        cluster: ClusterId,
    ) -> Self {
        Self {
            cas,
            catalog,
            ledger,
            keypair,
            node,
            cluster,
        }
    }

    /// Creates a snapshot: exports the source KV and volume, stores the
    /// composite payload, registers the catalog entry, and anchors it in
    /// the ledger.
    pub async fn create(
        &self,
        id: &SnapshotId,
        source: &dyn SourceKv,
        volume: &dyn VolumeSource,
        policy: CommitPolicy,
    ) -> Result<SnapshotOutcome, SnapshotError> {
        let (kv_len, kv_stream) = source.export().await?;
        let (volume_len, volume_stream) = volume.archive().await?;

        let header = CompositeHeader { kv_len, volume_len };
        let composite = io::Cursor::new(header.encode().to_vec())
            .chain(kv_stream)
            .chain(volume_stream);

        let mut object_meta = Metadata::new();
        let _ = object_meta.insert("kind".to_owned(), "snapshot".to_owned());
        let _ = object_meta.insert("snapshot_id".to_owned(), id.to_string());
        let object = self.cas.store(composite, object_meta).await?;

        info!(snapshot = %id, root = %object.root, size = object.total_size, "snapshot placed");

        let mut metadata = Metadata::new();
        let _ = metadata.insert("root".to_owned(), object.root.to_hex());
        let _ = metadata.insert("total_size".to_owned(), object.total_size.to_string());
        let _ = metadata.insert("chunk_count".to_owned(), object.chunk_count().to_string());
        let _ = metadata.insert("source_cluster".to_owned(), self.cluster.to_string());
        let _ = metadata.insert("created_at".to_owned(), object.created_at.to_string());
        let _ = metadata.insert("status".to_owned(), "registered".to_owned());

        self.catalog
            .write()
            .await
            .add_snapshot(id.as_str(), metadata.clone())?;

        let payload = to_borsh_vec(&SnapshotRegister {
            snapshot_id: id.clone(),
            root: object.root,
            size: object.total_size,
            source_cluster: self.cluster.clone(),
            created_at: object.created_at,
        })
        .expect("register tuple serializes");
        let tx = Transaction::sign(
            TxBody {
                kind: TxKind::SnapshotRegister,
                payload,
                origin: self.node.clone(),
            },
            &self.keypair,
        );
        let tx_hash = self.ledger.submit_tx(tx)?;
        let _ = metadata.insert("tx_hash".to_owned(), tx_hash.to_hex());

        let committed_height = match policy {
            CommitPolicy::FireAndForget => {
                self.catalog
                    .write()
                    .await
                    .update_snapshot_metadata(id.as_str(), metadata)?;
                None
            }
            CommitPolicy::WaitForCommit { timeout, poll } => {
                let height = self.wait_for_commit(&tx_hash, timeout, poll).await?;
                let proof = self.ledger.proof(&tx_hash)?;

                let _ = metadata.insert("status".to_owned(), "committed".to_owned());
                let _ = metadata.insert("commit_height".to_owned(), height.to_string());
                let _ = metadata.insert(
                    "commit_proof".to_owned(),
                    serde_json::to_string(&proof).expect("proof serializes"),
                );
                self.catalog
                    .write()
                    .await
                    .update_snapshot_metadata(id.as_str(), metadata)?;
                Some(height)
            }
        };

        Ok(SnapshotOutcome {
            object,
            tx_hash,
            committed_height,
        })
    }

    async fn wait_for_commit(
        &self,
        tx_hash: &Hash,
        timeout: Duration,
        poll: Duration,
    ) -> Result<u64, SnapshotError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(height) = self.ledger.tx_height(tx_hash)? {
                return Ok(height);
            }
            if Instant::now() >= deadline {
                warn!(%tx_hash, "snapshot registration still pending at deadline");
                return Err(SnapshotError::CommitTimeout(*tx_hash));
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Restores a snapshot into `source` and `sink`.
    ///
    /// With `verify_proof`, the attached commit proof must check out
    /// against this node's ledger records before any byte moves.
    pub async fn restore(
        &self,
        id: &SnapshotId,
        source: &dyn SourceKv,
        sink_dest: &dyn VolumeSink,
        verify_proof: bool,
    ) -> Result<(), SnapshotError> {
        let record = self.catalog.read().await.get_snapshot(id.as_str());
        if !record.present {
            return Err(SnapshotError::NotFound(id.clone()));
        }
        let metadata = record
            .metadata
            .ok_or(SnapshotError::MissingMetadata("root"))?;

        let root: Hash = metadata
            .get("root")
            .ok_or(SnapshotError::MissingMetadata("root"))?
            .parse()
            .map_err(|_| SnapshotError::MissingMetadata("root"))?;

        if verify_proof {
            let proof: CommitProof = metadata
                .get("commit_proof")
                .and_then(|json| serde_json::from_str(json).ok())
                .ok_or_else(|| SnapshotError::ProofRejected(id.clone()))?;
            if !self.ledger.verify_commit_proof(&proof)? {
                return Err(SnapshotError::ProofRejected(id.clone()));
            }
        }

        let chunks = self.cas.retrieve(root).await?;
        let io_chunks =
            chunks.map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)));
        let mut reader = StreamReader::new(Box::pin(io_chunks));

        let header = CompositeHeader::read_from(&mut reader).await?;

        let mut kv_part = (&mut reader).take(header.kv_len);
        source
            .restore(&mut kv_part)
            .await
            .map_err(SnapshotError::from_io)?;
        // Skip whatever the consumer left unread so the volume stream
        // starts at its recorded offset.
        let _ = copy(&mut kv_part, &mut sink()).await.map_err(SnapshotError::from_io)?;

        let mut volume_part = (&mut reader).take(header.volume_len);
        sink_dest
            .unpack(&mut volume_part)
            .await
            .map_err(SnapshotError::from_io)?;

        info!(snapshot = %id, %root, "snapshot restored");
        Ok(())
    }
}
