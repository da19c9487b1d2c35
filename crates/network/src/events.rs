use std::collections::HashMap;

use futures_util::StreamExt;
use libp2p::gossipsub::Event as GossipsubEvent;
use libp2p::identify::Event as IdentifyEvent;
use libp2p::mdns::Event as MdnsEvent;
use libp2p::request_response::{
    Event as RequestResponseEvent, Message as RequestResponseMessage, OutboundRequestId,
};
use libp2p::swarm::{Swarm, SwarmEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::behaviour::{Behaviour, BehaviourEvent};
use crate::client::{Command, NetworkClient};
use crate::config::NetworkConfig;
use crate::peers::PeerTable;
use crate::types::NetworkEvent;
use crate::NetworkError;

const COMMAND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 256;

/// Builds the swarm and spawns its event loop.
///
/// Returns the command handle, the inbound event stream, and the loop's
/// join handle (resolves after [`NetworkClient::shutdown`]).
pub fn spawn(
    config: &NetworkConfig,
) -> eyre::Result<(NetworkClient, mpsc::Receiver<NetworkEvent>, JoinHandle<()>)> {
    let swarm = Behaviour::build_swarm(config)?;

    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

    let event_loop = EventLoop {
        swarm,
        command_rx,
        event_tx,
        peers: PeerTable::new(config.gossip.peer_ttl),
        prune_interval: tokio::time::interval(
            (config.gossip.peer_ttl / 2).max(core::time::Duration::from_secs(1)),
        ),
        pending_requests: HashMap::new(),
    };
    let handle = tokio::spawn(event_loop.run());

    Ok((NetworkClient { command_tx }, event_rx, handle))
}

struct EventLoop {
    swarm: Swarm<Behaviour>,
    command_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<NetworkEvent>,
    peers: PeerTable,
    prune_interval: tokio::time::Interval,
    pending_requests: HashMap<OutboundRequestId, oneshot::Sender<Result<Vec<u8>, NetworkError>>>,
}

impl EventLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event).await;
                }
                command = self.command_rx.recv() => {
                    let Some(command) = command else {
                        info!("all network clients dropped, stopping event loop");
                        return;
                    };
                    if matches!(command, Command::Shutdown) {
                        info!("network event loop shutting down");
                        return;
                    }
                    self.handle_command(command);
                }
                _ = self.prune_interval.tick() => {
                    self.peers.prune();
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe { topic, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .subscribe(&topic)
                    .map(|_| ())
                    .map_err(|err| NetworkError::Subscribe(err.to_string()));
                let _ = reply.send(result);
            }
            Command::Publish { topic, data, reply } => {
                let result = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(topic, data)
                    .map_err(|err| NetworkError::Publish(err.to_string()));
                let _ = reply.send(result);
            }
            Command::Dial { addr, reply } => {
                let result = self
                    .swarm
                    .dial(addr)
                    .map_err(|err| NetworkError::Dial(err.to_string()));
                let _ = reply.send(result);
            }
            Command::PeerCount { reply } => {
                let _ = reply.send(self.peers.len());
            }
            Command::Peers { reply } => {
                let _ = reply.send(self.peers.peers());
            }
            Command::Request { peer, data, reply } => {
                let request_id = self.swarm.behaviour_mut().direct.send_request(&peer, data);
                let _ = self.pending_requests.insert(request_id, reply);
            }
            Command::Respond { channel, data } => {
                if self
                    .swarm
                    .behaviour_mut()
                    .direct
                    .send_response(channel, data)
                    .is_err()
                {
                    debug!("response channel closed before reply");
                }
            }
            Command::Shutdown => {}
        }
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<BehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(BehaviourEvent::Gossipsub(event)) => {
                self.handle_gossipsub_event(event).await;
            }
            SwarmEvent::Behaviour(BehaviourEvent::Identify(event)) => {
                if let IdentifyEvent::Received { peer_id, .. } = event {
                    self.peers.record(peer_id);
                }
            }
            SwarmEvent::Behaviour(BehaviourEvent::Mdns(event)) => match event {
                MdnsEvent::Discovered(discovered) => {
                    for (peer_id, addr) in discovered {
                        debug!(%peer_id, %addr, "mdns discovered peer");
                        if let Err(err) = self.swarm.dial(addr) {
                            debug!(%err, "failed to dial mdns peer");
                        }
                    }
                }
                MdnsEvent::Expired(expired) => {
                    for (peer_id, _) in expired {
                        self.peers.remove(&peer_id);
                    }
                }
            },
            SwarmEvent::Behaviour(BehaviourEvent::Ping(event)) => {
                if event.result.is_ok() {
                    self.peers.record(event.peer);
                }
            }
            SwarmEvent::Behaviour(BehaviourEvent::Direct(event)) => {
                self.handle_direct_event(event).await;
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(%address, "listening");
                if let Err(err) = self
                    .event_tx
                    .send(NetworkEvent::ListeningOn { address })
                    .await
                {
                    error!(%err, "failed to forward listening event");
                }
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                self.peers.record(peer_id);
            }
            _ => {}
        }
    }

    async fn handle_direct_event(&mut self, event: RequestResponseEvent<Vec<u8>, Vec<u8>>) {
        match event {
            RequestResponseEvent::Message { peer, message, .. } => match message {
                RequestResponseMessage::Request {
                    request, channel, ..
                } => {
                    self.peers.record(peer);
                    if let Err(err) = self
                        .event_tx
                        .send(NetworkEvent::Request {
                            origin: peer,
                            data: request,
                            channel,
                        })
                        .await
                    {
                        error!(%err, "failed to forward direct request");
                    }
                }
                RequestResponseMessage::Response {
                    request_id,
                    response,
                } => {
                    if let Some(reply) = self.pending_requests.remove(&request_id) {
                        let _ = reply.send(Ok(response));
                    }
                }
            },
            RequestResponseEvent::OutboundFailure {
                request_id, error, ..
            } => {
                if let Some(reply) = self.pending_requests.remove(&request_id) {
                    let _ = reply.send(Err(NetworkError::RequestFailed(error.to_string())));
                }
            }
            RequestResponseEvent::InboundFailure { error, .. } => {
                debug!(%error, "inbound direct exchange failed");
            }
            RequestResponseEvent::ResponseSent { .. } => {}
        }
    }

    async fn handle_gossipsub_event(&mut self, event: GossipsubEvent) {
        match event {
            GossipsubEvent::Message { message, .. } => {
                let local = *self.swarm.local_peer_id();
                let Some(origin) = message.source else {
                    debug!("dropping gossip message without a source");
                    return;
                };
                // Our own traffic reflected back by the mesh.
                if origin == local {
                    return;
                }
                self.peers.record(origin);

                if let Err(err) = self
                    .event_tx
                    .send(NetworkEvent::Message {
                        origin,
                        topic: message.topic,
                        data: message.data,
                    })
                    .await
                {
                    error!(%err, "failed to forward gossip message");
                }
            }
            GossipsubEvent::Subscribed { peer_id, topic } => {
                self.peers.record(peer_id);
                if (self
                    .event_tx
                    .send(NetworkEvent::Subscribed { peer_id, topic })
                    .await)
                    .is_err()
                {
                    error!("failed to forward subscribed event");
                }
            }
            GossipsubEvent::Unsubscribed { .. }
            | GossipsubEvent::GossipsubNotSupported { .. }
            | GossipsubEvent::SlowPeer { .. } => {}
        }
    }
}
