use tokio::io::{AsyncRead, AsyncReadExt};

use crate::SnapshotError;

/// Leading magic of every composite snapshot payload.
pub const MAGIC: [u8; 4] = *b"STR1";

/// Total header length: magic + two big-endian u64 lengths.
pub const HEADER_LEN: usize = 4 + 8 + 8;

/// Self-describing header for the two sub-streams of a snapshot payload.
///
/// The lengths are explicit so restore can split the composite without
/// trusting fixed offsets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompositeHeader {
    pub kv_len: u64,
    pub volume_len: u64,
}

impl CompositeHeader {
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0; HEADER_LEN];
        bytes[..4].copy_from_slice(&MAGIC);
        bytes[4..12].copy_from_slice(&self.kv_len.to_be_bytes());
        bytes[12..].copy_from_slice(&self.volume_len.to_be_bytes());
        bytes
    }

    /// Reads and validates a header from the front of `reader`.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, SnapshotError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut bytes = [0; HEADER_LEN];
        reader.read_exact(&mut bytes).await.map_err(|err| {
            if err.kind() == std::io::ErrorKind::UnexpectedEof {
                SnapshotError::MalformedHeader
            } else {
                SnapshotError::from_io(err)
            }
        })?;

        if bytes[..4] != MAGIC {
            return Err(SnapshotError::MalformedHeader);
        }

        let mut kv_len = [0; 8];
        kv_len.copy_from_slice(&bytes[4..12]);
        let mut volume_len = [0; 8];
        volume_len.copy_from_slice(&bytes[12..]);

        Ok(Self {
            kv_len: u64::from_be_bytes(kv_len),
            volume_len: u64::from_be_bytes(volume_len),
        })
    }
}
