use std::collections::{BTreeMap, BTreeSet, VecDeque};

use borsh::from_slice as from_borsh_slice;
use strata_crypto::KeyRotation;
use strata_primitives::{Hash, SnapshotId};
use tracing::debug;

use crate::types::{Block, SnapshotRegister, Transaction, TxKind};
use crate::validator::ValidatorSet;
use crate::LedgerError;

/// Buffered signed transactions awaiting inclusion.
///
/// Admission verifies the signature against the known public key of the
/// origin and runs kind-specific checks; the proposer drains in
/// insertion order.
#[derive(Debug, Default)]
pub struct Mempool {
    queue: VecDeque<Transaction>,
    pending_ids: BTreeSet<Hash>,
    committed_ids: BTreeSet<Hash>,
    /// Snapshot id → committed height, for duplicate-registration checks.
    committed_snapshots: BTreeMap<SnapshotId, u64>,
}

impl Mempool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Validates and buffers `tx`, returning its id.
    pub fn admit(
        &mut self,
        tx: Transaction,
        validators: &ValidatorSet,
    ) -> Result<Hash, LedgerError> {
        let public = validators
            .public_key(&tx.body.origin)
            .ok_or_else(|| LedgerError::UnknownOrigin(tx.body.origin.to_string()))?;
        tx.verify(public).map_err(|_| LedgerError::BadSignature)?;

        let id = tx.id();
        if self.pending_ids.contains(&id) || self.committed_ids.contains(&id) {
            return Err(LedgerError::DuplicateTx(id));
        }

        match tx.body.kind {
            TxKind::SnapshotRegister | TxKind::ImageRegister => {
                let register: SnapshotRegister = from_borsh_slice(&tx.body.payload)
                    .map_err(|_| LedgerError::MalformedPayload)?;
                if let Some(height) = self.committed_snapshots.get(&register.snapshot_id) {
                    return Err(LedgerError::SnapshotAlreadyRegistered(
                        register.snapshot_id.to_string(),
                        *height,
                    ));
                }
            }
            TxKind::KeyRotation => {
                let rotation: KeyRotation = from_borsh_slice(&tx.body.payload)
                    .map_err(|_| LedgerError::MalformedPayload)?;
                let current = validators.rotation_sequence(&tx.body.origin);
                if rotation.sequence <= current {
                    return Err(LedgerError::StaleRotation {
                        got: rotation.sequence,
                        current,
                    });
                }
                // The transaction signature is the old key's authorization;
                // admission already verified it above against the origin's
                // registered key.
                if rotation.old_public != *public {
                    return Err(LedgerError::MalformedPayload);
                }
            }
        }

        let _ = self.pending_ids.insert(id);
        self.queue.push_back(tx);
        debug!(%id, pending = self.queue.len(), "admitted transaction");
        Ok(id)
    }

    /// Takes up to `max` transactions in insertion order.
    pub fn drain(&mut self, max: usize) -> Vec<Transaction> {
        let take = max.min(self.queue.len());
        let drained: Vec<Transaction> = self.queue.drain(..take).collect();
        for tx in &drained {
            let _ = self.pending_ids.remove(&tx.id());
        }
        drained
    }

    /// Puts proposed-but-uncommitted transactions back at the front.
    pub fn requeue(&mut self, transactions: Vec<Transaction>) {
        for tx in transactions.into_iter().rev() {
            let id = tx.id();
            if self.committed_ids.contains(&id) || !self.pending_ids.insert(id) {
                continue;
            }
            self.queue.push_front(tx);
        }
    }

    /// Records a committed block so duplicates are refused from now on.
    pub fn mark_committed(&mut self, block: &Block) {
        for tx in &block.transactions {
            let id = tx.id();
            let _ = self.pending_ids.remove(&id);
            let _ = self.committed_ids.insert(id);
            self.queue.retain(|queued| queued.id() != id);

            if matches!(tx.body.kind, TxKind::SnapshotRegister | TxKind::ImageRegister) {
                if let Ok(register) = from_borsh_slice::<SnapshotRegister>(&tx.body.payload) {
                    let _ = self
                        .committed_snapshots
                        .entry(register.snapshot_id)
                        .or_insert(block.header.height);
                }
            }
        }
    }
}
