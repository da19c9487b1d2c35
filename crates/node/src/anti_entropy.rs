use core::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use strata_catalog::SharedCatalog;
use strata_crypto::Keypair;
use strata_network::{NetworkClient, TOPIC_ANTI_ENTROPY};
use strata_primitives::NodeId;
use strata_sync::RootAnnouncement;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

/// Broadcasts the signed catalog state root every interval. Divergence
/// handling happens on the receive side (`gossip::inbound_dispatch`).
pub(crate) async fn announce_loop(
    node_id: NodeId,
    keypair: Keypair,
    catalog: SharedCatalog,
    network: NetworkClient,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut tick = tokio::time::interval(interval.max(Duration::from_millis(10)));

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("anti-entropy announcements stopping");
                return;
            }
            _ = tick.tick() => {
                let root = catalog.read().await.state_root();
                let announcement =
                    RootAnnouncement::sign(node_id.clone(), root, now_nanos(), &keypair);

                match network.publish(TOPIC_ANTI_ENTROPY, announcement.to_wire()).await {
                    Ok(_) => debug!(%root, "announced catalog root"),
                    Err(err) => debug!(%err, "root announcement deferred"),
                }
            }
        }
    }
}
