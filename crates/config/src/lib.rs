//! Node configuration: the `config.toml` schema and the on-disk data
//! layout.
//!
//! Durations are written as `*_ms` integer fields so the file stays
//! hand-editable; conversion to `Duration` happens at the wiring layer.

use std::fs::{read_to_string, write};
use std::net::SocketAddr;

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result as EyreResult, WrapErr};
use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};
use strata_primitives::{ClusterId, NodeId};

pub mod dirs;

pub use dirs::DataLayout;

pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Deserialize, Serialize)]
pub struct ConfigFile {
    pub node: NodeSection,

    #[serde(
        with = "serde_identity",
        default = "libp2p_identity::Keypair::generate_ed25519"
    )]
    pub identity: libp2p_identity::Keypair,

    pub swarm: SwarmSection,

    #[serde(default)]
    pub bootstrap: BootstrapSection,

    pub api: ApiSection,

    #[serde(default)]
    pub gossip: GossipSection,

    #[serde(default)]
    pub sync: SyncSection,

    pub cas: CasSection,

    pub ledger: LedgerSection,

    #[serde(default)]
    pub tls: TlsSection,

    pub datastore: DataStoreSection,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NodeSection {
    pub id: NodeId,
    pub cluster: ClusterId,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SwarmSection {
    pub listen: Vec<Multiaddr>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct BootstrapSection {
    #[serde(default)]
    pub seed_peers: Vec<Multiaddr>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ApiSection {
    pub listen: SocketAddr,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GossipSection {
    pub interval_ms: u64,
    pub fanout: usize,
    pub max_batch_bytes: usize,
    pub peer_ttl_ms: u64,
    pub mdns: bool,
}

impl Default for GossipSection {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            fanout: 6,
            max_batch_bytes: 1024 * 1024,
            peer_ttl_ms: 120_000,
            mdns: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SyncSection {
    pub interval_ms: u64,
    pub request_suppress_window_ms: u64,
    pub max_bundles_per_interval: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            request_suppress_window_ms: 10_000,
            max_bundles_per_interval: 4,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CasSection {
    /// Per-namespace chunk size in bytes. Default 64 MiB.
    pub chunk_size: u64,

    /// Root of the filesystem blob backend.
    pub blob_root: Utf8PathBuf,

    /// S3-compatible endpoint, when the deployment replaces the
    /// filesystem backend out of tree.
    #[serde(default)]
    pub blob_endpoint: Option<String>,
    #[serde(default)]
    pub blob_access_key: Option<String>,
    #[serde(default)]
    pub blob_secret_key: Option<String>,

    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl CasSection {
    #[must_use]
    pub fn defaults_with_root(blob_root: Utf8PathBuf) -> Self {
        Self {
            chunk_size: 64 * 1024 * 1024,
            blob_root,
            blob_endpoint: None,
            blob_access_key: None,
            blob_secret_key: None,
            retry_max_attempts: 4,
            retry_base_delay_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ValidatorEntry {
    pub id: NodeId,
    /// Hex-encoded Ed25519 public key.
    pub public_key: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LedgerSection {
    pub validators: Vec<ValidatorEntry>,

    /// Defaults to `⌊2N/3⌋ + 1` when absent.
    #[serde(default)]
    pub quorum_threshold: Option<u64>,

    pub max_tx_per_block: usize,
    pub segment_max_blocks: u64,

    pub propose_timeout_ms: u64,
    pub prevote_timeout_ms: u64,
    pub precommit_timeout_ms: u64,
    pub commit_timeout_ms: u64,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            validators: Vec::new(),
            quorum_threshold: None,
            max_tx_per_block: 128,
            segment_max_blocks: 4096,
            propose_timeout_ms: 3_000,
            prevote_timeout_ms: 1_000,
            precommit_timeout_ms: 1_000,
            commit_timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TlsSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cert_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub key_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub ca_path: Option<Utf8PathBuf>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DataStoreSection {
    pub path: Utf8PathBuf,
}

impl ConfigFile {
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let raw = read_to_string(&path).wrap_err_with(|| format!("failed to read {path}"))?;
        toml::from_str(&raw).wrap_err_with(|| format!("failed to parse {path}"))
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let raw = toml::to_string_pretty(self).wrap_err("failed to serialize configuration")?;
        write(&path, raw).wrap_err_with(|| format!("failed to write {path}"))?;
        Ok(())
    }

    #[must_use]
    pub fn data_layout(&self) -> DataLayout {
        DataLayout::new(self.datastore.path.clone())
    }
}

mod serde_identity {
    use libp2p_identity::Keypair;
    use serde::de::Error as SerdeError;
    use serde::ser::Error as SerdeSerError;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(keypair: &Keypair, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = keypair
            .to_protobuf_encoding()
            .map_err(|err| S::Error::custom(format!("unencodable identity: {err}")))?;
        serializer.serialize_str(&hex::encode(encoded))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Keypair, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(encoded).map_err(SerdeError::custom)?;
        Keypair::from_protobuf_encoding(&bytes).map_err(SerdeError::custom)
    }
}
