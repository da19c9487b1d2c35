use std::fs::create_dir_all;

use camino::Utf8PathBuf;
use eyre::{Result as EyreResult, WrapErr};

/// The node's persisted-state layout under `data_dir`.
#[derive(Clone, Debug)]
pub struct DataLayout {
    root: Utf8PathBuf,
}

impl DataLayout {
    #[must_use]
    pub const fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub const fn root(&self) -> &Utf8PathBuf {
        &self.root
    }

    /// Catalog CRDT state (embedded database).
    #[must_use]
    pub fn catalog_dir(&self) -> Utf8PathBuf {
        self.root.join("catalog")
    }

    /// Local CAS chunk cache.
    #[must_use]
    pub fn cas_cache_dir(&self) -> Utf8PathBuf {
        self.root.join("cas_cache")
    }

    /// Append-only ledger segments.
    #[must_use]
    pub fn ledger_dir(&self) -> Utf8PathBuf {
        self.root.join("ledger")
    }

    /// Private key material (files are mode 0600).
    #[must_use]
    pub fn keys_dir(&self) -> Utf8PathBuf {
        self.root.join("keys")
    }

    /// Creates every directory of the layout.
    pub fn ensure(&self) -> EyreResult<()> {
        for dir in [
            self.catalog_dir(),
            self.cas_cache_dir(),
            self.ledger_dir(),
            self.keys_dir(),
        ] {
            create_dir_all(&dir).wrap_err_with(|| format!("failed to create {dir}"))?;
        }
        Ok(())
    }
}
