use libp2p::gossipsub::{IdentTopic, MessageId};
use libp2p::request_response::ResponseChannel;
use libp2p::{Multiaddr, PeerId};
use tokio::sync::{mpsc, oneshot};

use crate::NetworkError;

/// Commands the event loop executes on the swarm.
#[derive(Debug)]
pub(crate) enum Command {
    Subscribe {
        topic: IdentTopic,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    Publish {
        topic: IdentTopic,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<MessageId, NetworkError>>,
    },
    Dial {
        addr: Multiaddr,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    PeerCount {
        reply: oneshot::Sender<usize>,
    },
    Peers {
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    Request {
        peer: PeerId,
        data: Vec<u8>,
        reply: oneshot::Sender<Result<Vec<u8>, NetworkError>>,
    },
    Respond {
        channel: ResponseChannel<Vec<u8>>,
        data: Vec<u8>,
    },
    Shutdown,
}

/// Cloneable handle onto the network event loop.
#[derive(Clone, Debug)]
pub struct NetworkClient {
    pub(crate) command_tx: mpsc::Sender<Command>,
}

impl NetworkClient {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, NetworkError> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .await
            .map_err(|_| NetworkError::ChannelClosed)?;
        rx.await.map_err(|_| NetworkError::ChannelClosed)
    }

    pub async fn subscribe(&self, topic: &str) -> Result<(), NetworkError> {
        let topic = IdentTopic::new(topic);
        self.request(|reply| Command::Subscribe { topic, reply })
            .await?
    }

    pub async fn publish(&self, topic: &str, data: Vec<u8>) -> Result<MessageId, NetworkError> {
        let topic = IdentTopic::new(topic);
        self.request(|reply| Command::Publish { topic, data, reply })
            .await?
    }

    pub async fn dial(&self, addr: Multiaddr) -> Result<(), NetworkError> {
        self.request(|reply| Command::Dial { addr, reply }).await?
    }

    pub async fn peer_count(&self) -> Result<usize, NetworkError> {
        self.request(|reply| Command::PeerCount { reply }).await
    }

    pub async fn peers(&self) -> Result<Vec<PeerId>, NetworkError> {
        self.request(|reply| Command::Peers { reply }).await
    }

    /// Sends a direct request to `peer` and awaits its response.
    pub async fn request_direct(
        &self,
        peer: PeerId,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, NetworkError> {
        self.request(|reply| Command::Request { peer, data, reply })
            .await?
    }

    /// Answers an inbound [`crate::NetworkEvent::Request`].
    pub async fn respond(&self, channel: ResponseChannel<Vec<u8>>, data: Vec<u8>) {
        let _ = self.command_tx.send(Command::Respond { channel, data }).await;
    }

    /// Asks the loop to drain and stop. Idempotent; a closed channel
    /// means it is already gone.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(Command::Shutdown).await;
    }
}
