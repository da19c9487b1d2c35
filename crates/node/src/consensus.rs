use borsh::to_vec as to_borsh_vec;
use strata_ledger::ConsensusMsg;
use strata_network::{NetworkClient, TOPIC_CONSENSUS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Forwards the consensus driver's broadcasts onto the consensus topic.
pub(crate) async fn outbound_pump(
    mut outbound: mpsc::Receiver<ConsensusMsg>,
    network: NetworkClient,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => {
                info!("consensus pump stopping");
                return;
            }
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    info!("consensus outbound closed");
                    return;
                };
                msg
            }
        };

        let encoded = to_borsh_vec(&msg).expect("consensus message serializes");
        if let Err(err) = network.publish(TOPIC_CONSENSUS, encoded).await {
            // Single-validator deployments have no mesh peers; their own
            // votes were already recorded locally.
            debug!(%err, "consensus broadcast deferred");
        }
    }
}
