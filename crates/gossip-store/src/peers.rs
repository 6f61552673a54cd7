/// Per-peer advertised capabilities.
///
/// Written by transport callbacks, read by ingestion and fan-out through
/// point-in-time snapshots.
use std::collections::HashMap;

use crate::capability::CapabilitySet;
use crate::types::PeerId;

#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<PeerId, CapabilitySet>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a peer's capability set wholesale.
    pub fn set(&mut self, peer: PeerId, capabilities: CapabilitySet) {
        self.peers.insert(peer, capabilities);
    }

    /// Record a peer seen on an inbound message. Does not touch a peer that
    /// is already known: capability changes arrive through [`set`](Self::set).
    pub fn observe(&mut self, peer: &PeerId, capabilities: &CapabilitySet) -> bool {
        if self.peers.contains_key(peer) {
            return false;
        }
        self.peers.insert(peer.clone(), capabilities.clone());
        true
    }

    pub fn remove(&mut self, peer: &PeerId) -> Option<CapabilitySet> {
        self.peers.remove(peer)
    }

    pub fn get(&self, peer: &PeerId) -> Option<&CapabilitySet> {
        self.peers.get(peer)
    }

    pub fn snapshot(&self) -> Vec<(PeerId, CapabilitySet)> {
        self.peers
            .iter()
            .map(|(peer, caps)| (peer.clone(), caps.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
