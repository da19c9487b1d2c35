use core::time::Duration;
use std::sync::Arc;

use borsh::{from_slice as from_borsh_slice, to_vec as to_borsh_vec};
use parking_lot::Mutex;
use strata_catalog::{Delta, SharedCatalog};
use strata_crdt::VectorClock;
use strata_crypto::Keypair;
use strata_ledger::{ConsensusMsg, Ledger};
use strata_network::{
    topic_hash, NetworkClient, NetworkEvent, PeerId, ResponseChannel, TOPIC_ANTI_ENTROPY,
    TOPIC_CATALOG_DELTAS, TOPIC_CONSENSUS,
};
use strata_primitives::NodeId;
use strata_sync::{BundleRequest, BundleResponse, RootAnnouncement, SyncDriver};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::PeerIndex;

/// Everything the inbound handling task needs.
pub(crate) struct Dispatcher {
    pub node_id: NodeId,
    pub keypair: Keypair,
    pub catalog: SharedCatalog,
    pub ledger: Ledger,
    pub network: NetworkClient,
    pub sync_driver: Arc<Mutex<SyncDriver>>,
    pub peer_index: PeerIndex,
    pub consensus_in: mpsc::Sender<ConsensusMsg>,
}

/// Consumes the network event stream.
///
/// One task for all topics: messages are processed to completion in
/// arrival order, which preserves per-peer FIFO and with it causal order
/// from any single origin.
pub(crate) async fn inbound_dispatch(
    dispatcher: Dispatcher,
    mut events: mpsc::Receiver<NetworkEvent>,
    cancel: CancellationToken,
) {
    let deltas_topic = topic_hash(TOPIC_CATALOG_DELTAS);
    let sync_topic = topic_hash(TOPIC_ANTI_ENTROPY);
    let consensus_topic = topic_hash(TOPIC_CONSENSUS);

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => {
                info!("inbound dispatch stopping");
                return;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    info!("network event stream closed");
                    return;
                };
                event
            }
        };

        match event {
            NetworkEvent::Message {
                origin,
                topic,
                data,
            } => {
                if topic == deltas_topic {
                    dispatcher.handle_delta_batch(&data).await;
                } else if topic == sync_topic {
                    dispatcher.handle_root_announcement(origin, &data).await;
                } else if topic == consensus_topic {
                    dispatcher.handle_consensus(&data).await;
                } else {
                    debug!(%topic, "message on unknown topic");
                }
            }
            NetworkEvent::Request {
                origin,
                data,
                channel,
            } => {
                dispatcher.handle_bundle_request(origin, &data, channel).await;
            }
            NetworkEvent::Subscribed { peer_id, topic } => {
                debug!(%peer_id, %topic, "peer subscribed");
            }
            NetworkEvent::ListeningOn { address } => {
                debug!(%address, "listening");
            }
        }
    }
}

impl Dispatcher {
    async fn handle_delta_batch(&self, data: &[u8]) {
        let batch: Vec<Delta> = match from_borsh_slice(data) {
            Ok(batch) => batch,
            Err(_) => {
                warn!("dropping malformed delta batch");
                return;
            }
        };

        for delta in batch {
            let Some(public) = self.ledger.public_key_of(&delta.body.origin) else {
                warn!(origin = %delta.body.origin, "delta from unknown origin");
                continue;
            };
            if delta.verify(&public).is_err() {
                warn!(origin = %delta.body.origin, "delta signature does not verify");
                continue;
            }

            match self.catalog.write().await.apply_delta(&delta) {
                Ok(true) => debug!(
                    origin = %delta.body.origin,
                    entity = %delta.body.entity_id,
                    "applied delta"
                ),
                Ok(false) => debug!(origin = %delta.body.origin, "duplicate delta"),
                Err(err) => warn!(%err, "delta application failed"),
            }
        }
    }

    async fn handle_root_announcement(&self, peer: PeerId, data: &[u8]) {
        let announcement = match RootAnnouncement::from_wire(data) {
            Ok(announcement) => announcement,
            Err(_) => {
                warn!("dropping malformed root announcement");
                return;
            }
        };

        let Some(public) = self.ledger.public_key_of(&announcement.origin) else {
            warn!(origin = %announcement.origin, "root announcement from unknown origin");
            return;
        };
        if announcement.verify(&public).is_err() {
            warn!(origin = %announcement.origin, "root announcement signature does not verify");
            return;
        }

        let _ = self
            .peer_index
            .lock()
            .insert(announcement.origin.clone(), peer);

        let local_root = self.catalog.read().await.state_root();
        let request = self.sync_driver.lock().should_request(
            &announcement.origin,
            &announcement.root,
            &local_root,
        );
        if !request {
            return;
        }

        info!(
            peer = %announcement.origin,
            theirs = %announcement.root,
            ours = %local_root,
            "catalog roots diverge, requesting bundle"
        );

        // The exchange can take a while; run it off the dispatch task so
        // inbound handling keeps flowing.
        let network = self.network.clone();
        let catalog = self.catalog.clone();
        let request = BundleRequest::sign(self.node_id.clone(), &self.keypair);
        let expected_public = public;
        let origin = announcement.origin;
        drop(tokio::spawn(async move {
            let response = match network.request_direct(peer, request.to_wire()).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(%err, %origin, "bundle request failed");
                    return;
                }
            };

            let response = match BundleResponse::from_wire(&response) {
                Ok(response) if response.origin == origin => response,
                _ => {
                    warn!(%origin, "malformed bundle response");
                    return;
                }
            };
            if response.verify(&expected_public).is_err() {
                warn!(%origin, "bundle response signature does not verify");
                return;
            }

            match catalog.write().await.merge_bundle(&response.bytes) {
                Ok(()) => info!(%origin, "merged repair bundle"),
                Err(err) => warn!(%err, %origin, "bundle merge failed"),
            }
        }));
    }

    async fn handle_bundle_request(
        &self,
        peer: PeerId,
        data: &[u8],
        channel: ResponseChannel<Vec<u8>>,
    ) {
        let request = match BundleRequest::from_wire(data) {
            Ok(request) => request,
            Err(_) => {
                warn!(%peer, "dropping malformed bundle request");
                return;
            }
        };

        let Some(public) = self.ledger.public_key_of(&request.origin) else {
            warn!(origin = %request.origin, "bundle request from unknown origin");
            return;
        };
        if request.verify(&public).is_err() {
            warn!(origin = %request.origin, "bundle request signature does not verify");
            return;
        }

        if !self.sync_driver.lock().allow_bundle() {
            debug!(origin = %request.origin, "bundle rate cap hit, not serving");
            return;
        }

        let bytes = match self.catalog.read().await.full_bundle() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(%err, "failed to serialize bundle");
                return;
            }
        };

        let response = BundleResponse::sign(self.node_id.clone(), bytes, &self.keypair);
        self.network.respond(channel, response.to_wire()).await;
        debug!(origin = %request.origin, "served repair bundle");
    }

    async fn handle_consensus(&self, data: &[u8]) {
        let msg: ConsensusMsg = match from_borsh_slice(data) {
            Ok(msg) => msg,
            Err(_) => {
                warn!("dropping malformed consensus message");
                return;
            }
        };
        if self.consensus_in.send(msg).await.is_err() {
            warn!("consensus driver gone, dropping message");
        }
    }
}

/// Emits the pending delta batch every interval, capped by bytes;
/// published deltas are confirmed out of the queue.
pub(crate) async fn outbound_loop(
    catalog: SharedCatalog,
    network: NetworkClient,
    interval: Duration,
    max_batch_bytes: usize,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(interval.max(Duration::from_millis(10)));

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("outbound gossip stopping");
                return;
            }
            _ = tick.tick() => {
                publish_pending(&catalog, &network, max_batch_bytes).await;
            }
        }
    }
}

async fn publish_pending(catalog: &SharedCatalog, network: &NetworkClient, max_batch_bytes: usize) {
    let pending = catalog.read().await.pending_deltas();
    if pending.is_empty() {
        return;
    }

    let mut batch = Vec::new();
    let mut batch_bytes = 0;
    let mut confirmed = VectorClock::new();
    for delta in pending {
        let len = delta.encoded_len();
        if !batch.is_empty() && batch_bytes + len > max_batch_bytes {
            break;
        }
        batch_bytes += len;
        confirmed.merge(&delta.body.clock);
        batch.push(delta);
    }

    let encoded = to_borsh_vec(&batch).expect("delta batch serializes");
    match network.publish(TOPIC_CATALOG_DELTAS, encoded).await {
        Ok(_) => {
            debug!(count = batch.len(), bytes = batch_bytes, "published delta batch");
            if let Err(err) = catalog.write().await.drain_confirmed_deltas(&confirmed) {
                warn!(%err, "failed to drain confirmed deltas");
            }
        }
        // Typically no mesh peers yet; the queue stays intact for the
        // next tick.
        Err(err) => debug!(%err, "delta publish deferred"),
    }
}

/// One best-effort drain used during shutdown.
pub(crate) async fn drain_outbound(catalog: &SharedCatalog, network: &NetworkClient) {
    publish_pending(catalog, network, usize::MAX).await;
}
