use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::capability::CapabilitySet;
use crate::types::PeerId;

/// Outbound side of the network, as seen by the store.
///
/// In production: implemented over the node's connection layer.
/// In tests and simulations: [`ChannelTransport`] or a recording mock.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send an encoded wire envelope to one peer.
    async fn send_to_peer(&self, peer: &PeerId, data: Bytes) -> Result<(), String>;
}

// ── ChannelTransport (in-process network) ───────────────────────────

/// Message delivered to a node's inbox on a [`ChannelNetwork`].
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub from: PeerId,
    /// Capabilities the sender registered with.
    pub capabilities: CapabilitySet,
    pub bytes: Bytes,
}

struct Mailbox {
    capabilities: CapabilitySet,
    inbox: mpsc::Sender<InboundMessage>,
}

/// Shared registry of in-process nodes. Clones share the registry.
#[derive(Clone, Default)]
pub struct ChannelNetwork {
    nodes: Arc<RwLock<HashMap<PeerId, Mailbox>>>,
}

impl ChannelNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the network. Returns the transport the node sends with and the
    /// inbox it receives on. Re-joining replaces the previous inbox.
    pub fn join(
        &self,
        peer: PeerId,
        capabilities: CapabilitySet,
        inbox_capacity: usize,
    ) -> (ChannelTransport, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(inbox_capacity);
        self.nodes.write().insert(
            peer.clone(),
            Mailbox {
                capabilities,
                inbox: tx,
            },
        );
        let transport = ChannelTransport {
            local: peer,
            network: self.clone(),
        };
        (transport, rx)
    }

    pub fn leave(&self, peer: &PeerId) {
        self.nodes.write().remove(peer);
    }

    pub fn capabilities_of(&self, peer: &PeerId) -> Option<CapabilitySet> {
        self.nodes.read().get(peer).map(|m| m.capabilities.clone())
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.nodes.read().keys().cloned().collect()
    }
}

/// Sends into other nodes' inboxes on a [`ChannelNetwork`].
#[derive(Clone)]
pub struct ChannelTransport {
    local: PeerId,
    network: ChannelNetwork,
}

impl ChannelTransport {
    pub fn local_id(&self) -> &PeerId {
        &self.local
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn send_to_peer(&self, peer: &PeerId, data: Bytes) -> Result<(), String> {
        let (inbox, capabilities) = {
            let nodes = self.network.nodes.read();
            let sender = nodes
                .get(&self.local)
                .map(|m| m.capabilities.clone())
                .unwrap_or_default();
            let target = nodes.get(peer).ok_or_else(|| format!("unknown peer {peer}"))?;
            (target.inbox.clone(), sender)
        };
        inbox
            .try_send(InboundMessage {
                from: self.local.clone(),
                capabilities,
                bytes: data,
            })
            .map_err(|e| format!("inbox of {peer}: {e}"))
    }
}

// ── MockTransport (tests) ───────────────────────────────────────────
