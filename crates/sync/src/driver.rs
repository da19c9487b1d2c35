use core::time::Duration;
use std::collections::BTreeMap;
use std::time::Instant;

use strata_primitives::{Hash, NodeId};
use tracing::debug;

/// Anti-entropy pacing knobs.
#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// How often the local root is announced.
    pub interval: Duration,

    /// A second request to the same peer inside this window is dropped.
    pub request_suppress_window: Duration,

    /// Full bundles served per interval, at most.
    pub max_bundles_per_interval: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            request_suppress_window: Duration::from_secs(10),
            max_bundles_per_interval: 4,
        }
    }
}

/// Decides when to request and when to serve repair bundles.
///
/// Pure bookkeeping; the node owns the transport and the catalog. One
/// instance per node, driven from the anti-entropy handling task.
#[derive(Debug)]
pub struct SyncDriver {
    config: SyncConfig,
    recent_requests: BTreeMap<NodeId, Instant>,
    window_start: Instant,
    bundles_served: usize,
}

impl SyncDriver {
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            recent_requests: BTreeMap::new(),
            window_start: Instant::now(),
            bundles_served: 0,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// A peer announced `peer_root`. Returns whether this node should
    /// request that peer's bundle: only on divergence, and only if no
    /// request went to the same peer within the suppression window.
    pub fn should_request(&mut self, peer: &NodeId, peer_root: &Hash, local_root: &Hash) -> bool {
        if peer_root == local_root {
            return false;
        }

        let now = Instant::now();
        if let Some(last) = self.recent_requests.get(peer) {
            if now.duration_since(*last) < self.config.request_suppress_window {
                debug!(%peer, "suppressing duplicate bundle request");
                return false;
            }
        }

        let _ = self.recent_requests.insert(peer.clone(), now);
        true
    }

    /// Whether another full bundle may be served right now; the budget
    /// replenishes every interval.
    pub fn allow_bundle(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.config.interval {
            self.window_start = now;
            self.bundles_served = 0;
        }

        if self.bundles_served >= self.config.max_bundles_per_interval {
            debug!("bundle rate cap hit, refusing to serve");
            return false;
        }
        self.bundles_served += 1;
        true
    }
}
