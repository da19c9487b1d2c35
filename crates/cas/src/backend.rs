use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use camino::Utf8PathBuf;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("object key {0} not found")]
    NotFound(String),
    /// Transient condition; safe to retry.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend i/o error: {0}")]
    Io(#[from] io::Error),
}

impl BackendError {
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// The blob layer the plane replicates into.
///
/// Deployments back this with an S3-compatible object store; the
/// filesystem implementation below is the bundled default and the
/// reference for the key semantics: whole-value put/get, stat by key,
/// idempotent delete.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BackendError>;

    async fn get(&self, key: &str) -> Result<Bytes, BackendError>;

    async fn stat(&self, key: &str) -> Result<bool, BackendError>;

    async fn delete(&self, key: &str) -> Result<(), BackendError>;
}

/// Blob backend over a local directory tree.
///
/// Keys map directly to relative paths. Writes go through a temp file
/// then rename, so readers never observe a partial object.
#[derive(Clone, Debug)]
pub struct FsBackend {
    root: Utf8PathBuf,
}

impl FsBackend {
    #[must_use]
    pub const fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    fn path_for(&self, key: &str) -> Utf8PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobBackend for FsBackend {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BackendError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("part");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BackendError> {
        let path = self.path_for(key);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(BackendError::NotFound(key.to_owned()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn stat(&self, key: &str) -> Result<bool, BackendError> {
        match fs::metadata(self.path_for(key)).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// In-process backend with write accounting, for tests that need to
/// observe whether a store performed backend writes at all.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, Bytes>>,
    puts: AtomicU64,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls observed since construction.
    #[must_use]
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.lock().len()
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), BackendError> {
        let _ = self.puts.fetch_add(1, Ordering::SeqCst);
        let _ = self.objects.lock().insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BackendError> {
        self.objects
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(key.to_owned()))
    }

    async fn stat(&self, key: &str) -> Result<bool, BackendError> {
        Ok(self.objects.lock().contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let _ = self.objects.lock().remove(key);
        Ok(())
    }
}
