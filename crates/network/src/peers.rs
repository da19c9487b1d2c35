use core::time::Duration;
use std::collections::BTreeMap;
use std::time::Instant;

use libp2p::PeerId;
use tracing::debug;

/// Known peers with last-seen bookkeeping.
///
/// Any valid inbound traffic refreshes a peer; peers silent past the TTL
/// are pruned on the next sweep. Accessed only from the event loop task.
#[derive(Debug)]
pub struct PeerTable {
    peers: BTreeMap<PeerId, Instant>,
    ttl: Duration,
}

impl PeerTable {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            peers: BTreeMap::new(),
            ttl,
        }
    }

    /// Marks `peer` as seen now.
    pub fn record(&mut self, peer: PeerId) {
        let _ = self.peers.insert(peer, Instant::now());
    }

    pub fn remove(&mut self, peer: &PeerId) {
        let _ = self.peers.remove(peer);
    }

    /// Drops peers not heard from within the TTL.
    pub fn prune(&mut self) {
        let ttl = self.ttl;
        let before = self.peers.len();
        self.peers.retain(|_, last_seen| last_seen.elapsed() < ttl);
        if self.peers.len() < before {
            debug!(
                pruned = before - self.peers.len(),
                remaining = self.peers.len(),
                "pruned stale peers"
            );
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    #[must_use]
    pub fn peers(&self) -> Vec<PeerId> {
        self.peers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_prune() {
        let mut table = PeerTable::new(Duration::from_secs(60));
        let peer = PeerId::random();

        table.record(peer);
        assert_eq!(table.len(), 1);

        table.prune();
        assert_eq!(table.len(), 1, "fresh peers survive pruning");
    }

    #[test]
    fn test_zero_ttl_prunes_everything() {
        let mut table = PeerTable::new(Duration::ZERO);
        table.record(PeerId::random());
        table.record(PeerId::random());

        table.prune();
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut table = PeerTable::new(Duration::from_secs(60));
        let peer = PeerId::random();

        table.record(peer);
        table.remove(&peer);
        assert!(table.is_empty());
    }
}
