use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_stream::try_stream;
use borsh::{from_slice as from_borsh_slice, to_vec as to_borsh_vec};
use bytes::Bytes;
use futures_util::Stream;
use strata_merkle::build_root;
use strata_primitives::Hash;
use strata_store::{Column, Database};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error};

use crate::key::{chunk_key, metadata_key};
use crate::object::ObjectInfo;
use crate::retry::RetryPolicy;
use crate::{BlobBackend, CasError};

/// The content-addressed storage engine.
///
/// Cheap to clone; all state lives behind the shared backend and the
/// embedded database (cache + object records).
#[derive(Clone)]
pub struct CasEngine {
    backend: Arc<dyn BlobBackend>,
    db: Arc<dyn Database>,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl std::fmt::Debug for CasEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasEngine")
            .field("chunk_size", &self.chunk_size)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

/// Reads up to `size` bytes, returning `None` at a clean end of stream.
async fn read_chunk<R>(reader: &mut R, size: usize) -> io::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0; size];
    let mut filled = 0;

    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }

    if filled == 0 {
        return Ok(None);
    }
    buf.truncate(filled);
    Ok(Some(Bytes::from(buf)))
}

impl CasEngine {
    #[must_use]
    pub fn new(
        backend: Arc<dyn BlobBackend>,
        db: Arc<dyn Database>,
        chunk_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            db,
            chunk_size,
            retry,
        }
    }

    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunks `reader`, places missing chunks, and records the object.
    ///
    /// Idempotent: storing bytes that already exist returns the original
    /// record without touching the backend again.
    pub async fn store<R>(
        &self,
        mut reader: R,
        metadata: BTreeMap<String, String>,
    ) -> Result<ObjectInfo, CasError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut chunks = Vec::new();
        let mut total_size = 0u64;

        while let Some(chunk) = read_chunk(&mut reader, self.chunk_size).await? {
            total_size += chunk.len() as u64;
            let address = Hash::digest(&chunk);

            if !self.exists(&address).await? {
                let key = chunk_key(&address);
                self.retry
                    .run("put chunk", || self.backend.put(&key, chunk.clone()))
                    .await?;
            }
            self.db.put(Column::CasCache, address.as_bytes(), &chunk)?;

            chunks.push(address);
        }

        if chunks.is_empty() {
            return Err(CasError::EmptyObject);
        }

        let root = build_root(&chunks).expect("chunk list is non-empty");

        if let Some(existing) = self.object_info_local(&root)? {
            debug!(%root, "object already stored locally, skipping write");
            return Ok(existing);
        }

        let meta_key = metadata_key(&root);
        let already_placed = self
            .retry
            .run("stat metadata", || self.backend.stat(&meta_key))
            .await?;
        if already_placed {
            let bytes = self
                .retry
                .run("get metadata", || self.backend.get(&meta_key))
                .await?;
            let info: ObjectInfo =
                from_borsh_slice(&bytes).map_err(|_| CasError::MalformedObject(root))?;
            self.db.put(Column::CasObjects, root.as_bytes(), &bytes)?;
            debug!(%root, "object already placed by a peer, adopting record");
            return Ok(info);
        }

        let info = ObjectInfo {
            root,
            chunks,
            total_size,
            chunk_size: self.chunk_size as u64,
            created_at: now_nanos(),
            metadata,
        };
        let bytes = to_borsh_vec(&info).expect("object record serializes");

        self.retry
            .run("put metadata", || {
                self.backend.put(&meta_key, Bytes::from(bytes.clone()))
            })
            .await?;
        self.db.put(Column::CasObjects, root.as_bytes(), &bytes)?;

        debug!(%root, chunks = info.chunk_count(), total_size, "stored object");
        Ok(info)
    }

    /// Streams the object's bytes back, verifying every chunk against its
    /// address and the chunk list against the requested root.
    pub async fn retrieve(
        &self,
        root: Hash,
    ) -> Result<impl Stream<Item = Result<Bytes, CasError>> + Send, CasError> {
        let info = self
            .object_info(&root)
            .await?
            .ok_or(CasError::ObjectNotFound(root))?;

        let computed =
            build_root(&info.chunks).map_err(|_| CasError::MalformedObject(root))?;
        if computed != root {
            error!(expected = %root, actual = %computed, "object record fails root check");
            return Err(CasError::RootMismatch {
                expected: root,
                actual: computed,
            });
        }

        let engine = self.clone();
        Ok(try_stream! {
            for address in info.chunks {
                let chunk = engine.fetch_chunk(&address).await?;
                yield chunk;
            }
        })
    }

    /// Convenience wrapper collecting the full object into memory.
    pub async fn retrieve_bytes(&self, root: Hash) -> Result<Vec<u8>, CasError> {
        use futures_util::TryStreamExt;

        let stream = self.retrieve(root).await?;
        futures_util::pin_mut!(stream);

        let mut out = Vec::new();
        while let Some(chunk) = stream.try_next().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    async fn fetch_chunk(&self, address: &Hash) -> Result<Bytes, CasError> {
        if let Some(bytes) = self.db.get(Column::CasCache, address.as_bytes())? {
            let bytes = Bytes::from(bytes);
            let actual = Hash::digest(&bytes);
            if actual != *address {
                error!(expected = %address, %actual, "local cache chunk fails verification");
                return Err(CasError::ChunkIntegrity {
                    expected: *address,
                    actual,
                });
            }
            return Ok(bytes);
        }

        let key = chunk_key(address);
        let bytes = self
            .retry
            .run("get chunk", || self.backend.get(&key))
            .await?;

        let actual = Hash::digest(&bytes);
        if actual != *address {
            error!(expected = %address, %actual, "backend chunk fails verification");
            return Err(CasError::ChunkIntegrity {
                expected: *address,
                actual,
            });
        }

        self.db.put(Column::CasCache, address.as_bytes(), &bytes)?;
        Ok(bytes)
    }

    /// Whether a chunk is present locally or in the backend.
    pub async fn exists(&self, address: &Hash) -> Result<bool, CasError> {
        if self.db.has(Column::CasCache, address.as_bytes())? {
            return Ok(true);
        }
        let key = chunk_key(address);
        Ok(self
            .retry
            .run("stat chunk", || self.backend.stat(&key))
            .await?)
    }

    fn object_info_local(&self, root: &Hash) -> Result<Option<ObjectInfo>, CasError> {
        let Some(bytes) = self.db.get(Column::CasObjects, root.as_bytes())? else {
            return Ok(None);
        };
        let info = from_borsh_slice(&bytes).map_err(|_| CasError::MalformedObject(*root))?;
        Ok(Some(info))
    }

    /// Resolves an object record, consulting the backend if this node has
    /// never seen the object.
    pub async fn object_info(&self, root: &Hash) -> Result<Option<ObjectInfo>, CasError> {
        if let Some(info) = self.object_info_local(root)? {
            return Ok(Some(info));
        }

        let meta_key = metadata_key(root);
        let placed = self
            .retry
            .run("stat metadata", || self.backend.stat(&meta_key))
            .await?;
        if !placed {
            return Ok(None);
        }

        let bytes = self
            .retry
            .run("get metadata", || self.backend.get(&meta_key))
            .await?;
        let info: ObjectInfo =
            from_borsh_slice(&bytes).map_err(|_| CasError::MalformedObject(*root))?;
        self.db.put(Column::CasObjects, root.as_bytes(), &bytes)?;
        Ok(Some(info))
    }

    /// Removes the object record, then deletes only those chunks no
    /// remaining object references.
    pub async fn delete(&self, root: &Hash) -> Result<(), CasError> {
        let info = self
            .object_info(root)
            .await?
            .ok_or(CasError::ObjectNotFound(*root))?;

        let meta_key = metadata_key(root);
        self.retry
            .run("delete metadata", || self.backend.delete(&meta_key))
            .await?;
        self.db.delete(Column::CasObjects, root.as_bytes())?;

        let mut referenced = BTreeSet::new();
        for (_, bytes) in self.db.iter_prefix(Column::CasObjects, &[])? {
            if let Ok(other) = from_borsh_slice::<ObjectInfo>(&bytes) {
                referenced.extend(other.chunks);
            }
        }

        for address in info.chunks.iter().collect::<BTreeSet<_>>() {
            if referenced.contains(address) {
                continue;
            }
            let key = chunk_key(address);
            self.retry
                .run("delete chunk", || self.backend.delete(&key))
                .await?;
            self.db.delete(Column::CasCache, address.as_bytes())?;
        }

        debug!(%root, "deleted object");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/engine.rs"]
mod tests;
