use libp2p::gossipsub::{IdentTopic, TopicHash};
use libp2p::request_response::ResponseChannel;
use libp2p::{Multiaddr, PeerId};

/// Catalog delta dissemination.
pub const TOPIC_CATALOG_DELTAS: &str = "/strata/catalog-deltas/1";
/// Anti-entropy root announcements.
pub const TOPIC_ANTI_ENTROPY: &str = "/strata/anti-entropy/1";
/// Ledger proposals and votes.
pub const TOPIC_CONSENSUS: &str = "/strata/consensus/1";

/// The hash gossipsub tags inbound messages of `name` with.
#[must_use]
pub fn topic_hash(name: &str) -> TopicHash {
    IdentTopic::new(name).hash()
}

/// What the event loop surfaces to the node.
#[derive(Debug)]
pub enum NetworkEvent {
    /// An inbound gossip message. Messages originated by the local peer
    /// are already filtered out.
    Message {
        origin: PeerId,
        topic: TopicHash,
        data: Vec<u8>,
    },
    /// A direct request (bundle exchange); answer it through
    /// [`crate::NetworkClient::respond`].
    Request {
        origin: PeerId,
        data: Vec<u8>,
        channel: ResponseChannel<Vec<u8>>,
    },
    Subscribed {
        peer_id: PeerId,
        topic: TopicHash,
    },
    ListeningOn {
        address: Multiaddr,
    },
}
