use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use borsh::{from_slice as from_borsh_slice, to_vec as to_borsh_vec};
use camino::Utf8PathBuf;
use strata_merkle::prove;
use strata_primitives::{Hash, NodeId};
use strata_store::{Column, Database, WriteBatch};
use tracing::info;

use crate::proof::CommitProof;
use crate::types::{Block, Transaction};
use crate::LedgerError;

const KEY_TIP: &[u8] = b"tip";

fn height_key(height: u64) -> Vec<u8> {
    let mut key = b"h/".to_vec();
    key.extend_from_slice(&height.to_be_bytes());
    key
}

fn tx_key(tx_hash: &Hash) -> Vec<u8> {
    let mut key = b"t/".to_vec();
    key.extend_from_slice(tx_hash.as_bytes());
    key
}

/// Where a block landed on disk.
#[derive(Debug, Clone, Copy, borsh::BorshSerialize, borsh::BorshDeserialize)]
struct BlockLocation {
    segment: u64,
    offset: u64,
}

/// Where a transaction landed in the chain.
#[derive(Debug, Clone, Copy, borsh::BorshSerialize, borsh::BorshDeserialize)]
struct TxLocation {
    height: u64,
    index: u64,
}

/// Append-only block storage.
///
/// Committed blocks are length-prefixed into segment files under the
/// ledger directory, `segment_max_blocks` per file; the embedded database
/// carries the height and transaction indices plus the tip. Blocks are
/// never rewritten and heights are contiguous by construction.
pub struct LedgerStore {
    dir: Utf8PathBuf,
    db: Arc<dyn Database>,
    segment_max_blocks: u64,
    tip: Option<u64>,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("dir", &self.dir)
            .field("segment_max_blocks", &self.segment_max_blocks)
            .field("tip", &self.tip)
            .finish_non_exhaustive()
    }
}

impl LedgerStore {
    /// Opens the store, writing the genesis block on first use.
    pub fn open(
        dir: Utf8PathBuf,
        db: Arc<dyn Database>,
        segment_max_blocks: u64,
        genesis_proposer: NodeId,
    ) -> Result<Self, LedgerError> {
        std::fs::create_dir_all(&dir)?;

        let tip = match db.get(Column::Ledger, KEY_TIP)? {
            Some(bytes) => Some(
                from_borsh_slice(&bytes)
                    .map_err(|_| LedgerError::CorruptSegment("tip".to_owned()))?,
            ),
            None => None,
        };

        let mut store = Self {
            dir,
            db,
            segment_max_blocks: segment_max_blocks.max(1),
            tip,
        };

        if store.tip.is_none() {
            store.append(&Block::genesis(genesis_proposer))?;
            info!("wrote genesis block");
        }

        Ok(store)
    }

    #[must_use]
    pub const fn tip(&self) -> Option<u64> {
        self.tip
    }

    fn segment_path(&self, segment: u64) -> Utf8PathBuf {
        self.dir.join(format!("segment-{segment:08}.log"))
    }

    /// Appends a committed block. The height must extend the tip by one.
    pub fn append(&mut self, block: &Block) -> Result<(), LedgerError> {
        let height = block.header.height;
        let expected = self.tip.map_or(0, |tip| tip + 1);
        if height != expected {
            return Err(LedgerError::NonContiguousHeight {
                got: height,
                tip: self.tip.unwrap_or(0),
            });
        }

        let segment = height / self.segment_max_blocks;
        let path = self.segment_path(segment);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let offset = file.seek(SeekFrom::End(0))?;

        let bytes = to_borsh_vec(block).expect("block serializes");
        let len = u32::try_from(bytes.len())
            .map_err(|_| LedgerError::CorruptSegment("oversized block".to_owned()))?;
        file.write_all(&len.to_be_bytes())?;
        file.write_all(&bytes)?;
        file.sync_data()?;

        let mut batch = WriteBatch::new();
        batch.put(
            Column::Ledger,
            height_key(height),
            to_borsh_vec(&BlockLocation { segment, offset }).expect("location serializes"),
        );
        for (index, tx) in block.transactions.iter().enumerate() {
            batch.put(
                Column::Ledger,
                tx_key(&tx.id()),
                to_borsh_vec(&TxLocation {
                    height,
                    index: index as u64,
                })
                .expect("location serializes"),
            );
        }
        batch.put(
            Column::Ledger,
            KEY_TIP,
            to_borsh_vec(&height).expect("u64 serializes"),
        );
        self.db.write(batch)?;

        self.tip = Some(height);
        Ok(())
    }

    /// Reads the committed block at `height`.
    pub fn block(&self, height: u64) -> Result<Block, LedgerError> {
        let location = self
            .db
            .get(Column::Ledger, &height_key(height))?
            .ok_or(LedgerError::BlockNotFound(height))?;
        let location: BlockLocation = from_borsh_slice(&location)
            .map_err(|_| LedgerError::CorruptSegment(format!("height index {height}")))?;

        let path = self.segment_path(location.segment);
        let mut file = File::open(&path)?;
        let _ = file.seek(SeekFrom::Start(location.offset))?;

        let mut len_bytes = [0; 4];
        file.read_exact(&mut len_bytes)?;
        let len = u32::from_be_bytes(len_bytes) as usize;

        let mut bytes = vec![0; len];
        file.read_exact(&mut bytes)?;

        from_borsh_slice(&bytes).map_err(|_| LedgerError::CorruptSegment(path.to_string()))
    }

    /// The height a transaction committed at, if any.
    pub fn tx_height(&self, tx_hash: &Hash) -> Result<Option<u64>, LedgerError> {
        let Some(bytes) = self.db.get(Column::Ledger, &tx_key(tx_hash))? else {
            return Ok(None);
        };
        let location: TxLocation = from_borsh_slice(&bytes)
            .map_err(|_| LedgerError::CorruptSegment(format!("tx index {tx_hash}")))?;
        Ok(Some(location.height))
    }

    /// Issues the commit proof for a committed transaction.
    pub fn proof(&self, tx_hash: &Hash) -> Result<CommitProof, LedgerError> {
        let location = self
            .db
            .get(Column::Ledger, &tx_key(tx_hash))?
            .ok_or(LedgerError::TxNotCommitted(*tx_hash))?;
        let location: TxLocation = from_borsh_slice(&location)
            .map_err(|_| LedgerError::CorruptSegment(format!("tx index {tx_hash}")))?;

        let block = self.block(location.height)?;
        let leaves: Vec<Hash> = block.transactions.iter().map(Transaction::id).collect();
        let index = usize::try_from(location.index).expect("index fits usize");
        let path = prove(&leaves, index)
            .map_err(|_| LedgerError::CorruptSegment(format!("tx index {tx_hash}")))?;

        Ok(CommitProof {
            tx_hash: *tx_hash,
            block_hash: block.hash(),
            height: location.height,
            index: location.index,
            path,
            commits: block.commits,
        })
    }
}

#[cfg(test)]
#[path = "tests/store.rs"]
mod tests;
