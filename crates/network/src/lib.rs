//! Gossip transport between catalog nodes.
//!
//! A libp2p swarm (gossipsub for topic fanout, identify and ping for
//! liveness, optional mDNS for local discovery) owned by a single event
//! loop task. The rest of the node talks to it through a cloneable
//! [`NetworkClient`] over a command channel and consumes inbound traffic
//! from an event stream, so no lock is ever held across network I/O.

use thiserror::Error;

pub mod behaviour;
pub mod client;
pub mod config;
pub mod events;
pub mod peers;
pub mod types;

pub use client::NetworkClient;
pub use config::{GossipConfig, NetworkConfig};
pub use events::spawn;
pub use libp2p::gossipsub::TopicHash;
pub use libp2p::request_response::ResponseChannel;
pub use libp2p::PeerId;
pub use peers::PeerTable;
pub use types::{
    topic_hash, NetworkEvent, TOPIC_ANTI_ENTROPY, TOPIC_CATALOG_DELTAS, TOPIC_CONSENSUS,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NetworkError {
    #[error("event loop has shut down")]
    ChannelClosed,
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("dial failed: {0}")]
    Dial(String),
    #[error("direct request failed: {0}")]
    RequestFailed(String),
}
