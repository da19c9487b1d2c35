use borsh::{to_vec as to_borsh_vec, BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use strata_crypto::{verify, CryptoError, Keypair};
use strata_primitives::{ClusterId, Hash, NodeId, PublicKey, Signature, SnapshotId};

/// Transaction families the ledger understands.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    SnapshotRegister,
    ImageRegister,
    KeyRotation,
}

/// The signed fields of a transaction, in canonical wire order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TxBody {
    pub kind: TxKind,
    pub payload: Vec<u8>,
    pub origin: NodeId,
}

/// A signed ledger transaction.
///
/// The id (and the Merkle leaf) is the digest of the full canonical
/// serialization, signature included, so two submissions of the same
/// body by different keys are distinct transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Transaction {
    pub body: TxBody,
    pub signature: Signature,
}

impl Transaction {
    #[must_use]
    pub fn sign(body: TxBody, keypair: &Keypair) -> Self {
        let signature = keypair.sign(&body.signing_bytes());
        Self { body, signature }
    }

    pub fn verify(&self, public: &PublicKey) -> Result<(), CryptoError> {
        verify(public, &self.body.signing_bytes(), &self.signature)
    }

    /// Digest of the canonical transaction bytes; doubles as the Merkle
    /// leaf inside a block.
    #[must_use]
    pub fn id(&self) -> Hash {
        Hash::digest(to_borsh_vec(self).expect("transaction serializes"))
    }
}

impl TxBody {
    #[must_use]
    pub fn signing_bytes(&self) -> Vec<u8> {
        to_borsh_vec(self).expect("transaction body serializes")
    }
}

/// Payload of a [`TxKind::SnapshotRegister`] transaction: the canonical
/// tuple anchoring a snapshot's metadata to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct SnapshotRegister {
    pub snapshot_id: SnapshotId,
    pub root: Hash,
    pub size: u64,
    pub source_cluster: ClusterId,
    pub created_at: u64,
}

/// Fixed-order block header.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct BlockHeader {
    pub height: u64,
    pub prev_hash: Hash,
    /// Merkle root over the transaction leaves; zero for an empty block.
    pub merkle_root: Hash,
    pub proposer: NodeId,
    pub timestamp: i64,
}

/// One validator's precommit over a committed block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct CommitSig {
    pub validator: NodeId,
    pub signature: Signature,
}

/// A committed (or candidate) block.
///
/// `commits` is populated at commit time and excluded from the block
/// hash, which covers the header and the ordered transaction list only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub commits: Vec<CommitSig>,
}

impl Block {
    /// Merkle root over `transactions`' leaves; [`Hash::ZERO`] when the
    /// block is empty.
    #[must_use]
    pub fn compute_tx_root(transactions: &[Transaction]) -> Hash {
        if transactions.is_empty() {
            return Hash::ZERO;
        }
        let leaves: Vec<Hash> = transactions.iter().map(Transaction::id).collect();
        strata_merkle::build_root(&leaves).expect("leaf list is non-empty")
    }

    /// Canonical block hash: header then ordered transactions.
    #[must_use]
    pub fn hash(&self) -> Hash {
        let bytes = to_borsh_vec(&(&self.header, &self.transactions))
            .expect("block serializes");
        Hash::digest(bytes)
    }

    /// Genesis: height 0, zero predecessor, no transactions.
    #[must_use]
    pub fn genesis(proposer: NodeId) -> Self {
        Self {
            header: BlockHeader {
                height: 0,
                prev_hash: Hash::ZERO,
                merkle_root: Hash::ZERO,
                proposer,
                timestamp: 0,
            },
            transactions: Vec::new(),
            commits: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::new(id).expect("valid id")
    }

    fn sample_tx(keypair: &Keypair, payload: &[u8]) -> Transaction {
        Transaction::sign(
            TxBody {
                kind: TxKind::SnapshotRegister,
                payload: payload.to_vec(),
                origin: node("n1"),
            },
            keypair,
        )
    }

    #[test]
    fn test_tx_sign_verify_and_id_stability() {
        let keypair = Keypair::random();
        let tx = sample_tx(&keypair, b"payload");

        assert!(tx.verify(&keypair.public()).is_ok());
        assert_eq!(tx.id(), tx.clone().id());

        let mut tampered = tx.clone();
        tampered.body.payload.push(0);
        assert!(tampered.verify(&keypair.public()).is_err());
        assert_ne!(tampered.id(), tx.id());
    }

    #[test]
    fn test_block_hash_excludes_commits() {
        let keypair = Keypair::random();
        let txs = vec![sample_tx(&keypair, b"a"), sample_tx(&keypair, b"b")];

        let mut block = Block {
            header: BlockHeader {
                height: 1,
                prev_hash: Hash::ZERO,
                merkle_root: Block::compute_tx_root(&txs),
                proposer: node("n1"),
                timestamp: 7,
            },
            transactions: txs,
            commits: Vec::new(),
        };

        let hash = block.hash();
        block.commits.push(CommitSig {
            validator: node("n2"),
            signature: keypair.sign(b"vote"),
        });
        assert_eq!(block.hash(), hash);

        block.header.timestamp = 8;
        assert_ne!(block.hash(), hash);
    }

    #[test]
    fn test_empty_tx_root_is_zero() {
        assert_eq!(Block::compute_tx_root(&[]), Hash::ZERO);
    }
}
