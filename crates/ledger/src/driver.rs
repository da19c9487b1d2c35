use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use borsh::from_slice as from_borsh_slice;
use parking_lot::{Mutex, RwLock};
use strata_crypto::{Keypair, KeyRotation};
use strata_primitives::{Hash, NodeId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::consensus::{ConsensusMsg, Effect, RoundState, Step, StepTimeouts};
use crate::mempool::Mempool;
use crate::proof::{verify_proof, CommitProof};
use crate::store::LedgerStore;
use crate::types::{Block, Transaction, TxKind};
use crate::validator::ValidatorHistory;
use crate::LedgerError;

/// How often the driver re-checks the mempool while a height is idle.
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Shared, cloneable view of ledger state.
///
/// The consensus driver is the single writer; everything else reads
/// through the locks or submits transactions into the mempool.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<RwLock<LedgerStore>>,
    mempool: Arc<Mutex<Mempool>>,
    history: Arc<RwLock<ValidatorHistory>>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("tip", &self.tip())
            .finish_non_exhaustive()
    }
}

impl Ledger {
    #[must_use]
    pub fn new(store: LedgerStore, history: ValidatorHistory) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            mempool: Arc::new(Mutex::new(Mempool::new())),
            history: Arc::new(RwLock::new(history)),
        }
    }

    /// Admits a signed transaction, returning its hash. The transaction
    /// stays pending until some future block commits it; callers needing
    /// finality poll [`Ledger::proof`].
    pub fn submit_tx(&self, tx: Transaction) -> Result<Hash, LedgerError> {
        let history = self.history.read();
        self.mempool.lock().admit(tx, history.current())
    }

    #[must_use]
    pub fn tip(&self) -> u64 {
        self.store.read().tip().unwrap_or(0)
    }

    pub fn block(&self, height: u64) -> Result<Block, LedgerError> {
        self.store.read().block(height)
    }

    pub fn proof(&self, tx_hash: &Hash) -> Result<CommitProof, LedgerError> {
        self.store.read().proof(tx_hash)
    }

    pub fn tx_height(&self, tx_hash: &Hash) -> Result<Option<u64>, LedgerError> {
        self.store.read().tx_height(tx_hash)
    }

    /// Looks up a node's current public key in the identity table (the
    /// validator set in force at the tip).
    #[must_use]
    pub fn public_key_of(&self, node: &NodeId) -> Option<strata_primitives::PublicKey> {
        self.history.read().current().public_key(node).copied()
    }

    /// Full proof verification against this node's ledger records,
    /// resolving the validator set at the proof's height.
    pub fn verify_commit_proof(&self, proof: &CommitProof) -> Result<bool, LedgerError> {
        let block = self.store.read().block(proof.height)?;
        let history = self.history.read();
        Ok(verify_proof(
            proof,
            &block.header,
            &block.hash(),
            history.set_at(proof.height),
        ))
    }
}

/// Owns the round state machine and sequences every ledger write.
pub struct ConsensusDriver {
    ledger: Ledger,
    state: RoundState,
    inbound: mpsc::Receiver<ConsensusMsg>,
    outbound: mpsc::Sender<ConsensusMsg>,
    max_tx_per_block: usize,
    /// Pending `(deadline, step, round)` timeout firings.
    timeouts: Vec<(Instant, Step, u32)>,
    height_started: bool,
}

impl std::fmt::Debug for ConsensusDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsensusDriver")
            .field("height", &self.state.height())
            .field("round", &self.state.round())
            .finish_non_exhaustive()
    }
}

impl ConsensusDriver {
    #[must_use]
    pub fn new(
        ledger: Ledger,
        node: NodeId,
        keypair: Keypair,
        timeouts: StepTimeouts,
        max_tx_per_block: usize,
        inbound: mpsc::Receiver<ConsensusMsg>,
        outbound: mpsc::Sender<ConsensusMsg>,
    ) -> Self {
        let validators = ledger.history.read().current().clone();
        let state = RoundState::new(node, keypair, validators, timeouts);
        Self {
            ledger,
            state,
            inbound,
            outbound,
            max_tx_per_block,
            timeouts: Vec::new(),
            height_started: false,
        }
    }

    /// Runs consensus until cancellation. Heights progress strictly
    /// sequentially; a height only begins once there is work (locally
    /// pending transactions or traffic from a peer that has some).
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), LedgerError> {
        loop {
            if !self.height_started && !self.ledger.mempool.lock().is_empty() {
                self.start_next_height().await?;
            }

            let next_deadline = self.timeouts.iter().map(|(at, ..)| *at).min();
            let sleep = match next_deadline {
                Some(at) => tokio::time::sleep_until(at.into()),
                None => tokio::time::sleep(IDLE_POLL),
            };

            tokio::select! {
                () = cancel.cancelled() => {
                    info!("consensus driver shutting down");
                    return Ok(());
                }
                msg = self.inbound.recv() => {
                    let Some(msg) = msg else {
                        info!("consensus inbound closed, stopping");
                        return Ok(());
                    };
                    if !self.height_started {
                        self.start_next_height().await?;
                    }
                    let effects = self.state.on_message(msg);
                    self.handle_effects(effects).await?;
                }
                () = sleep => {
                    let now = Instant::now();
                    let due: Vec<(Instant, Step, u32)> = self
                        .timeouts
                        .iter()
                        .copied()
                        .filter(|(at, ..)| *at <= now)
                        .collect();
                    self.timeouts.retain(|(at, ..)| *at > now);
                    for (_, step, round) in due {
                        let effects = self.state.on_timeout(step, round);
                        self.handle_effects(effects).await?;
                    }
                }
            }
        }
    }

    async fn start_next_height(&mut self) -> Result<(), LedgerError> {
        let (tip, prev_hash) = {
            let store = self.ledger.store.read();
            let tip = store.tip().unwrap_or(0);
            (tip, store.block(tip)?.hash())
        };
        let height = tip + 1;

        self.state
            .set_validators(self.ledger.history.read().set_at(height).clone());

        // Every validator drains the same bounded batch so whoever ends
        // up proposing (after any round rotation) has candidates.
        let candidates = self.ledger.mempool.lock().drain(self.max_tx_per_block);

        self.timeouts.clear();
        self.height_started = true;
        let effects = self.state.start_height(height, prev_hash, candidates);
        self.handle_effects(effects).await
    }

    async fn handle_effects(&mut self, effects: Vec<Effect>) -> Result<(), LedgerError> {
        for effect in effects {
            match effect {
                Effect::Broadcast(msg) => {
                    if self.outbound.send(msg).await.is_err() {
                        warn!("consensus outbound closed, dropping broadcast");
                    }
                }
                Effect::ScheduleTimeout { step, round, delay } => {
                    self.timeouts.push((Instant::now() + delay, step, round));
                }
                Effect::Commit(block) => {
                    self.commit(block)?;
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self, block: Block) -> Result<(), LedgerError> {
        let height = block.header.height;

        self.ledger.store.write().append(&block)?;
        self.ledger.mempool.lock().mark_committed(&block);

        // Rotations take effect at the next height.
        let mut rotated = false;
        let mut next_set = self.ledger.history.read().set_at(height).clone();
        for tx in &block.transactions {
            if tx.body.kind != TxKind::KeyRotation {
                continue;
            }
            match from_borsh_slice::<KeyRotation>(&tx.body.payload) {
                Ok(rotation) => {
                    if next_set.apply_rotation(&rotation) {
                        rotated = true;
                    }
                }
                Err(_) => error!(height, "committed rotation payload fails to decode"),
            }
        }
        if rotated {
            self.ledger.history.write().push(height + 1, next_set);
        }

        // Anything drained but not committed goes back to the pool.
        let leftovers = self.state.take_candidates();
        let committed: std::collections::BTreeSet<Hash> =
            block.transactions.iter().map(Transaction::id).collect();
        let leftovers: Vec<Transaction> = leftovers
            .into_iter()
            .filter(|tx| !committed.contains(&tx.id()))
            .collect();
        if !leftovers.is_empty() {
            self.ledger.mempool.lock().requeue(leftovers);
        }

        info!(
            height,
            txs = block.transactions.len(),
            "committed block"
        );

        self.timeouts.clear();
        self.height_started = false;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/driver.rs"]
mod tests;
