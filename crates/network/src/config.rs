use core::time::Duration;

use libp2p::identity::Keypair;
use multiaddr::Multiaddr;
use serde::{Deserialize, Serialize};

/// Gossip scheduling knobs.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct GossipConfig {
    /// How often the outbound delta batch is emitted.
    pub interval: Duration,

    /// Target peers per emission round.
    pub fanout: usize,

    /// Upper bound on one emission batch, in encoded bytes.
    pub max_batch_bytes: usize,

    /// Peers silent for longer than this are pruned from the table.
    pub peer_ttl: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            fanout: 6,
            max_batch_bytes: 1024 * 1024,
            peer_ttl: Duration::from_secs(120),
        }
    }
}

/// Everything the swarm needs to come up.
#[derive(Debug)]
#[non_exhaustive]
pub struct NetworkConfig {
    pub identity: Keypair,

    pub listen: Vec<Multiaddr>,

    /// Bootstrap peers dialed at startup.
    pub seed_peers: Vec<Multiaddr>,

    /// Local-network discovery; useful in dev clusters, off in prod.
    pub mdns: bool,

    pub gossip: GossipConfig,
}

impl NetworkConfig {
    #[must_use]
    pub fn new(identity: Keypair, listen: Vec<Multiaddr>, seed_peers: Vec<Multiaddr>) -> Self {
        Self {
            identity,
            listen,
            seed_peers,
            mdns: false,
            gossip: GossipConfig::default(),
        }
    }
}
