use core::time::Duration;

use eyre::WrapErr;
use libp2p::request_response::{self, ProtocolSupport};
use libp2p::swarm::behaviour::toggle::Toggle;
use libp2p::swarm::{NetworkBehaviour, Swarm};
use libp2p::{
    gossipsub, identify, mdns, noise, ping, tcp, tls, yamux, StreamProtocol, SwarmBuilder,
};
use tracing::warn;

use crate::config::NetworkConfig;

const PROTOCOL_VERSION: &str = concat!("/", env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
const STRATA_SYNC_PROTOCOL: StreamProtocol = StreamProtocol::new("/strata/sync/1");

/// Opaque request/response bytes for direct bundle exchange; the sync
/// layer owns the actual message encoding.
pub type DirectExchange = request_response::cbor::Behaviour<Vec<u8>, Vec<u8>>;

#[derive(NetworkBehaviour)]
pub struct Behaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub identify: identify::Behaviour,
    pub mdns: Toggle<mdns::tokio::Behaviour>,
    pub ping: ping::Behaviour,
    pub direct: DirectExchange,
}

impl Behaviour {
    pub fn build_swarm(config: &NetworkConfig) -> eyre::Result<Swarm<Self>> {
        let peer_id = config.identity.public().to_peer_id();

        let mut swarm = SwarmBuilder::with_existing_identity(config.identity.clone())
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                (tls::Config::new, noise::Config::new),
                yamux::Config::default,
            )?
            .with_quic()
            .with_behaviour(|key| {
                let behaviour = Self {
                    gossipsub: {
                        // Mesh width follows the configured fanout;
                        // shorter backoffs than the defaults so meshes
                        // re-form quickly after node restarts.
                        let fanout = config.gossip.fanout.max(1);
                        let gossipsub_config = gossipsub::ConfigBuilder::default()
                            .mesh_n_low(fanout.saturating_sub(2).max(1))
                            .mesh_n(fanout)
                            .mesh_n_high(fanout * 2)
                            .mesh_outbound_min(fanout.saturating_sub(2).max(1).min(fanout / 2))
                            .prune_backoff(Duration::from_secs(5))
                            .heartbeat_interval(Duration::from_secs(1))
                            .build()
                            .expect("valid gossipsub config");

                        gossipsub::Behaviour::new(
                            gossipsub::MessageAuthenticity::Signed(key.clone()),
                            gossipsub_config,
                        )?
                    },
                    identify: identify::Behaviour::new(
                        identify::Config::new(PROTOCOL_VERSION.to_owned(), key.public())
                            .with_push_listen_addr_updates(true),
                    ),
                    mdns: config
                        .mdns
                        .then_some(())
                        .map(|()| mdns::tokio::Behaviour::new(mdns::Config::default(), peer_id))
                        .transpose()?
                        .into(),
                    ping: ping::Behaviour::default(),
                    direct: DirectExchange::new(
                        [(STRATA_SYNC_PROTOCOL, ProtocolSupport::Full)],
                        request_response::Config::default(),
                    ),
                };

                Ok(behaviour)
            })?
            .with_swarm_config(|cfg| cfg.with_idle_connection_timeout(Duration::from_secs(30)))
            .build();

        for addr in &config.listen {
            let _ignored = swarm
                .listen_on(addr.clone())
                .wrap_err_with(|| format!("failed to listen on '{addr}'"))?;
        }

        for addr in &config.seed_peers {
            if let Err(err) = swarm.dial(addr.clone()) {
                warn!(%err, %addr, "failed to dial seed peer");
            }
        }

        Ok(swarm)
    }
}
