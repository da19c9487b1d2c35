//! Node wiring: one process hosting the catalog, the CAS engine, the
//! gossip transport, anti-entropy, the consensus driver and the REST
//! façade as cooperative tasks over the shared runtime.

use core::time::Duration;
use std::collections::BTreeMap;
use std::sync::Arc;

use eyre::{Result as EyreResult, WrapErr};
use parking_lot::Mutex;
use strata_cas::{CasEngine, FsBackend, RetryPolicy};
use strata_catalog::{Catalog, SharedCatalog};
use strata_config::ConfigFile;
use strata_crypto::{Keypair, Keystore};
use strata_ledger::{
    ConsensusDriver, Ledger, LedgerStore, StepTimeouts, Validator, ValidatorHistory, ValidatorSet,
};
use strata_network::{
    GossipConfig, NetworkClient, NetworkConfig, PeerId, TOPIC_ANTI_ENTROPY, TOPIC_CATALOG_DELTAS,
    TOPIC_CONSENSUS,
};
use strata_primitives::{NodeId, PublicKey};
use strata_server::AppState;
use strata_snapshot::SnapshotPipeline;
use strata_store::RocksDB;
use strata_sync::{SyncConfig, SyncDriver};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod anti_entropy;
mod consensus;
mod gossip;

/// Mapping from catalog node identities to their libp2p peers, learned
/// from signed root announcements.
pub(crate) type PeerIndex = Arc<Mutex<BTreeMap<NodeId, PeerId>>>;

/// A running strata node.
pub struct Node {
    pub node_id: NodeId,
    pub catalog: SharedCatalog,
    pub cas: CasEngine,
    pub ledger: Ledger,
    pub network: NetworkClient,
    pub pipeline: Arc<SnapshotPipeline>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    network_task: JoinHandle<()>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Builds every subsystem from the configuration and spawns the task
    /// set. Fatal conditions (inaccessible data dir or key material)
    /// surface as errors; the caller exits non-zero.
    pub async fn start(config: ConfigFile) -> EyreResult<Self> {
        let layout = config.data_layout();
        layout.ensure()?;

        let node_id = config.node.id.clone();

        let keystore = Keystore::new(layout.keys_dir());
        let keypair = if keystore.exists() {
            keystore.load().wrap_err("key material inaccessible")?
        } else {
            let keypair = Keypair::random();
            keystore.save(&keypair).wrap_err("failed to persist node key")?;
            info!(public_key = %keypair.public(), "generated node signing key");
            keypair
        };

        let catalog_db = Arc::new(
            RocksDB::open(&layout.catalog_dir()).wrap_err("failed to open catalog store")?,
        );
        let cas_db = Arc::new(
            RocksDB::open(&layout.cas_cache_dir()).wrap_err("failed to open cas cache")?,
        );
        let ledger_db = Arc::new(
            RocksDB::open(&layout.ledger_dir().join("index"))
                .wrap_err("failed to open ledger index")?,
        );

        let catalog: SharedCatalog = Arc::new(RwLock::new(
            Catalog::open(node_id.clone(), keypair.clone(), catalog_db)
                .wrap_err("failed to open catalog")?,
        ));

        let cas = CasEngine::new(
            Arc::new(FsBackend::new(config.cas.blob_root.clone())),
            cas_db,
            usize::try_from(config.cas.chunk_size).wrap_err("chunk_size does not fit usize")?,
            RetryPolicy {
                max_attempts: config.cas.retry_max_attempts,
                base_delay: Duration::from_millis(config.cas.retry_base_delay_ms),
            },
        );

        let validators = config
            .ledger
            .validators
            .iter()
            .map(|entry| {
                Ok(Validator {
                    id: entry.id.clone(),
                    public_key: PublicKey::from_hex(&entry.public_key)
                        .wrap_err_with(|| format!("bad public key for {}", entry.id))?,
                })
            })
            .collect::<EyreResult<Vec<_>>>()?;
        if !validators.iter().any(|v| v.public_key == keypair.public()) {
            warn!("this node's key is not in the validator set; it will not vote");
        }
        let validator_set = ValidatorSet::new(validators, config.ledger.quorum_threshold);
        let genesis_proposer = validator_set
            .iter()
            .next()
            .map_or_else(|| node_id.clone(), |v| v.id.clone());

        let ledger_store = LedgerStore::open(
            layout.ledger_dir(),
            ledger_db,
            config.ledger.segment_max_blocks,
            genesis_proposer,
        )
        .wrap_err("failed to open ledger")?;
        let ledger = Ledger::new(ledger_store, ValidatorHistory::genesis(validator_set));

        let (consensus_in_tx, consensus_in_rx) = mpsc::channel(256);
        let (consensus_out_tx, consensus_out_rx) = mpsc::channel(256);
        let driver = ConsensusDriver::new(
            ledger.clone(),
            node_id.clone(),
            keypair.clone(),
            StepTimeouts {
                propose: Duration::from_millis(config.ledger.propose_timeout_ms),
                prevote: Duration::from_millis(config.ledger.prevote_timeout_ms),
                precommit: Duration::from_millis(config.ledger.precommit_timeout_ms),
                commit: Duration::from_millis(config.ledger.commit_timeout_ms),
            },
            config.ledger.max_tx_per_block,
            consensus_in_rx,
            consensus_out_tx,
        );

        let mut network_config = NetworkConfig::new(
            config.identity.clone(),
            config.swarm.listen.clone(),
            config.bootstrap.seed_peers.clone(),
        );
        network_config.mdns = config.gossip.mdns;
        network_config.gossip = GossipConfig {
            interval: Duration::from_millis(config.gossip.interval_ms),
            fanout: config.gossip.fanout,
            max_batch_bytes: config.gossip.max_batch_bytes,
            peer_ttl: Duration::from_millis(config.gossip.peer_ttl_ms),
        };

        let (network, events, network_task) =
            strata_network::spawn(&network_config).wrap_err("failed to start network")?;
        for topic in [TOPIC_CATALOG_DELTAS, TOPIC_ANTI_ENTROPY, TOPIC_CONSENSUS] {
            network
                .subscribe(topic)
                .await
                .wrap_err_with(|| format!("failed to subscribe {topic}"))?;
        }

        let sync_driver = Arc::new(Mutex::new(SyncDriver::new(SyncConfig {
            interval: Duration::from_millis(config.sync.interval_ms),
            request_suppress_window: Duration::from_millis(config.sync.request_suppress_window_ms),
            max_bundles_per_interval: config.sync.max_bundles_per_interval,
        })));
        let peer_index: PeerIndex = Arc::new(Mutex::new(BTreeMap::new()));

        let pipeline = Arc::new(SnapshotPipeline::new(
            cas.clone(),
            catalog.clone(),
            ledger.clone(),
            keypair.clone(),
            node_id.clone(),
            config.node.cluster.clone(),
        ));

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        tasks.push(tokio::spawn(gossip::inbound_dispatch(
            gossip::Dispatcher {
                node_id: node_id.clone(),
                keypair: keypair.clone(),
                catalog: catalog.clone(),
                ledger: ledger.clone(),
                network: network.clone(),
                sync_driver: sync_driver.clone(),
                peer_index,
                consensus_in: consensus_in_tx,
            },
            events,
            cancel.clone(),
        )));

        tasks.push(tokio::spawn(gossip::outbound_loop(
            catalog.clone(),
            network.clone(),
            network_config.gossip.interval,
            network_config.gossip.max_batch_bytes,
            cancel.clone(),
        )));

        tasks.push(tokio::spawn(anti_entropy::announce_loop(
            node_id.clone(),
            keypair,
            catalog.clone(),
            network.clone(),
            Duration::from_millis(config.sync.interval_ms),
            cancel.clone(),
        )));

        tasks.push(tokio::spawn(consensus::outbound_pump(
            consensus_out_rx,
            network.clone(),
            cancel.clone(),
        )));

        {
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = driver.run(cancel).await {
                    error!(%err, "consensus driver failed");
                }
            }));
        }

        {
            let state = AppState {
                node_id: node_id.clone(),
                catalog: catalog.clone(),
                cas: cas.clone(),
                ledger: ledger.clone(),
                network: network.clone(),
            };
            let listen = config.api.listen;
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = strata_server::serve(state, listen, cancel).await {
                    error!(%err, "api server failed");
                }
            }));
        }

        info!(node = %node_id, "node started");

        Ok(Self {
            node_id,
            catalog,
            cas,
            ledger,
            network,
            pipeline,
            cancel,
            tasks,
            network_task,
        })
    }

    /// Stops every task, draining the outbound delta queue once within a
    /// bounded window before the transport goes away.
    pub async fn shutdown(self) {
        info!(node = %self.node_id, "shutting down");
        self.cancel.cancel();

        let drain = gossip::drain_outbound(&self.catalog, &self.network);
        if tokio::time::timeout(Duration::from_secs(5), drain)
            .await
            .is_err()
        {
            warn!("outbound drain did not finish before the deadline");
        }

        for task in self.tasks {
            let _ = task.await;
        }

        self.network.shutdown().await;
        let _ = self.network_task.await;
    }
}
