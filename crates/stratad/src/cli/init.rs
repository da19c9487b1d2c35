use camino::Utf8Path;
use clap::Parser;
use eyre::{bail, Result as EyreResult};
use strata_config::{
    ApiSection, BootstrapSection, CasSection, ConfigFile, DataStoreSection, GossipSection,
    LedgerSection, NodeSection, SwarmSection, SyncSection, TlsSection, ValidatorEntry,
};
use strata_crypto::{Keypair, Keystore};
use strata_primitives::{ClusterId, NodeId};
use tracing::info;

use crate::defaults;

/// Creates the home directory, identity, key material and a starting
/// configuration.
#[derive(Debug, Parser)]
pub struct InitCommand {
    /// Stable identity of this node.
    #[arg(long)]
    node_id: NodeId,

    /// Cluster this node snapshots.
    #[arg(long)]
    cluster: ClusterId,

    /// Swarm listen multiaddrs.
    #[arg(long, default_values_t = [defaults::DEFAULT_SWARM_LISTEN.parse::<multiaddr::Multiaddr>().expect("valid default multiaddr")])]
    listen: Vec<multiaddr::Multiaddr>,

    /// REST API listen address.
    #[arg(long, default_value = defaults::DEFAULT_API_LISTEN)]
    api_listen: std::net::SocketAddr,

    /// Overwrite an existing configuration.
    #[arg(long)]
    force: bool,
}

impl InitCommand {
    pub fn run(self, home: &Utf8Path) -> EyreResult<()> {
        if ConfigFile::exists(home) && !self.force {
            bail!("{home} is already initialized (pass --force to overwrite)");
        }
        std::fs::create_dir_all(home)?;

        let config = ConfigFile {
            node: NodeSection {
                id: self.node_id.clone(),
                cluster: self.cluster,
            },
            identity: libp2p_identity::Keypair::generate_ed25519(),
            swarm: SwarmSection {
                listen: self.listen,
            },
            bootstrap: BootstrapSection::default(),
            api: ApiSection {
                listen: self.api_listen,
            },
            gossip: GossipSection::default(),
            sync: SyncSection::default(),
            cas: CasSection::defaults_with_root(home.join("blobs")),
            ledger: LedgerSection::default(),
            tls: TlsSection::default(),
            datastore: DataStoreSection {
                path: home.join("data"),
            },
        };

        let layout = config.data_layout();
        layout.ensure()?;

        // The signing key is generated up front so its public half can be
        // placed in every peer's validator table.
        let keystore = Keystore::new(layout.keys_dir());
        let keypair = Keypair::random();
        keystore.save(&keypair)?;

        let mut config = config;
        config.ledger.validators.push(ValidatorEntry {
            id: self.node_id.clone(),
            public_key: keypair.public().to_hex(),
        });

        config.save(home)?;

        info!(home = %home, node = %self.node_id, "initialized");
        println!("node id:     {}", self.node_id);
        println!("public key:  {}", keypair.public());
        println!("peer id:     {}", config.identity.public().to_peer_id());
        println!();
        println!("add this node to each peer's [[ledger.validators]] table");

        Ok(())
    }
}
