//! The Global Consensus Ledger.
//!
//! An append-only sequence of blocks, each committed by a strict
//! supermajority of validators running a propose/prevote/precommit round
//! state machine. Committed snapshot registrations become provable: the
//! ledger issues Merkle inclusion proofs that verify against the block
//! header and the precommit signature set in force at that height.

use strata_primitives::Hash;
use strata_store::StoreError;
use thiserror::Error;

pub mod consensus;
pub mod driver;
pub mod mempool;
pub mod proof;
pub mod store;
pub mod types;
pub mod validator;

pub use consensus::{ConsensusMsg, Effect, Proposal, RoundState, Step, StepTimeouts, Vote};
pub use driver::{ConsensusDriver, Ledger};
pub use mempool::Mempool;
pub use proof::{verify_proof, CommitProof};
pub use store::LedgerStore;
pub use types::{
    Block, BlockHeader, CommitSig, SnapshotRegister, Transaction, TxBody, TxKind,
};
pub use validator::{Validator, ValidatorHistory, ValidatorSet};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("transaction signature does not verify")]
    BadSignature,

    #[error("transaction origin {0} has no known public key")]
    UnknownOrigin(String),

    #[error("transaction {0} already admitted or committed")]
    DuplicateTx(Hash),

    #[error("snapshot {0} already registered at height {1}")]
    SnapshotAlreadyRegistered(String, u64),

    #[error("key rotation sequence {got} is not above the current {current}")]
    StaleRotation { got: u64, current: u64 },

    #[error("transaction payload does not decode for its kind")]
    MalformedPayload,

    #[error("block at height {got} is not contiguous with tip {tip}")]
    NonContiguousHeight { got: u64, tip: u64 },

    #[error("block {0} not found")]
    BlockNotFound(u64),

    #[error("transaction {0} is not committed")]
    TxNotCommitted(Hash),

    #[error("ledger segment file corrupt: {0}")]
    CorruptSegment(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
