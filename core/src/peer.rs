use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// A node we know about, addressed by host ("ip:port").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Peer {
    pub host: String,
}

impl Peer {
    pub fn new(host: impl Into<String>) -> Peer {
        Peer { host: host.into() }
    }

    pub fn matches(&self, host: &str) -> bool {
        self.host == host
    }
}

/// What a peer reports about itself during sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeerStatus {
    pub latest_block_hash: String,
    pub latest_block_number: u64,
    pub known_peers: Vec<Peer>,
}

/// The set of peers this node currently knows, keyed by host.
#[derive(Default)]
pub struct PeerSet {
    peers: RwLock<HashMap<String, Peer>>,
}

impl PeerSet {
    pub fn new() -> PeerSet {
        PeerSet::default()
    }

    pub fn from_hosts<I, S>(hosts: I) -> PeerSet
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = PeerSet::new();
        for host in hosts {
            set.add(Peer::new(host));
        }
        set
    }

    /// Add a peer; returns false when it was already known.
    pub fn add(&self, peer: Peer) -> bool {
        let mut peers = self.peers.write().unwrap();
        peers.insert(peer.host.clone(), peer).is_none()
    }

    /// Everyone we know except ourselves, in stable host order.
    pub fn copy(&self, self_host: &str) -> Vec<Peer> {
        let peers = self.peers.read().unwrap();

        let mut out: Vec<Peer> = peers
            .values()
            .filter(|peer| !peer.matches(self_host))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.host.cmp(&b.host));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_excludes_self() {
        let set = PeerSet::from_hosts(["localhost:8080", "localhost:9080"]);
        assert!(!set.add(Peer::new("localhost:9080")));

        let peers = set.copy("localhost:8080");
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].host, "localhost:9080");
    }
}
