use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Keypair;

const KEY_FILE: &str = "node.key";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KeystoreError {
    #[error("key material inaccessible at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("key file {0} is malformed")]
    Malformed(Utf8PathBuf),
}

/// On-disk storage for the node's private key material.
///
/// Key files live under `<data_dir>/keys/` with mode 0600; anything else
/// there is refused at load time.
#[derive(Clone, Debug)]
pub struct Keystore {
    dir: Utf8PathBuf,
}

impl Keystore {
    #[must_use]
    pub fn new(dir: Utf8PathBuf) -> Self {
        Self { dir }
    }

    fn key_path(&self) -> Utf8PathBuf {
        self.dir.join(KEY_FILE)
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.key_path().exists()
    }

    /// Writes `keypair` to the key file, creating the directory as needed.
    pub fn save(&self, keypair: &Keypair) -> Result<(), KeystoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| KeystoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.key_path();
        let encoded = hex::encode(keypair.secret_bytes());
        fs::write(&path, encoded).map_err(|source| KeystoreError::Io {
            path: path.clone(),
            source,
        })?;

        restrict_permissions(&path)?;

        Ok(())
    }

    pub fn load(&self) -> Result<Keypair, KeystoreError> {
        let path = self.key_path();
        let encoded = fs::read_to_string(&path).map_err(|source| KeystoreError::Io {
            path: path.clone(),
            source,
        })?;

        let bytes = hex::decode(encoded.trim()).map_err(|_| KeystoreError::Malformed(path.clone()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeystoreError::Malformed(path))?;

        Ok(Keypair::from_secret_bytes(bytes))
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Utf8Path) -> Result<(), KeystoreError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|source| {
        KeystoreError::Io {
            path: path.to_owned(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Utf8Path) -> Result<(), KeystoreError> {
    Ok(())
}
