use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use gossip_store::{
    CapabilitySet, ChannelNetwork, GossipStore, ManualClock, MemoryBackend, PeerId, SqliteBackend,
    StoreChannels, StoreConfig, StoreEvent, StoreHandle, TradeStatsAggregator,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One simulated node: a store, its inbox pump and its lazy consumer.
pub struct SimNode {
    pub id: PeerId,
    pub capabilities: CapabilitySet,
    pub handle: StoreHandle,
    pub aggregator: TradeStatsAggregator,
    tasks: Vec<JoinHandle<()>>,
}

impl SimNode {
    pub async fn start(
        network: &ChannelNetwork,
        index: usize,
        capabilities: CapabilitySet,
        base: &StoreConfig,
        clock: &ManualClock,
        data_dir: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let id = PeerId::new(format!("node-{index}"));
        let (transport, mut inbox) = network.join(id.clone(), capabilities.clone(), base.fanout_queue);
        let config = StoreConfig {
            local_capabilities: capabilities.clone(),
            ..base.clone()
        };

        let StoreChannels { handle, events } = match data_dir {
            Some(dir) => {
                let path = dir.join(format!("{id}.db"));
                let backend = SqliteBackend::open(&path)
                    .with_context(|| format!("open {}", path.display()))?;
                GossipStore::open(config, backend, Arc::new(transport), Arc::new(clock.clone())).await?
            }
            None => {
                GossipStore::open(config, MemoryBackend::new(), Arc::new(transport), Arc::new(clock.clone()))
                    .await?
            }
        };

        let aggregator = TradeStatsAggregator::new();
        let lazy = handle.subscribe_lazy();
        aggregator.seed(handle.query_all(|p| p.as_trade_statistics().is_some()));

        let pump = {
            let handle = handle.clone();
            tokio::spawn(async move {
                while let Some(msg) = inbox.recv().await {
                    handle.on_peer_message(&msg.from, &msg.capabilities, &msg.bytes);
                }
            })
        };

        let tasks = vec![pump, aggregator.spawn(lazy), spawn_event_log(id.clone(), events)];

        Ok(Self {
            id,
            capabilities,
            handle,
            aggregator,
            tasks,
        })
    }

    /// Stop the store and its helper tasks.
    pub async fn stop(self, network: &ChannelNetwork) {
        network.leave(&self.id);
        if let Err(e) = self.handle.shutdown().await {
            warn!(node = %self.id, "shutdown: {e}");
        }
        for task in self.tasks {
            task.abort();
        }
    }
}

fn spawn_event_log(
    node: PeerId,
    mut events: tokio::sync::mpsc::Receiver<StoreEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                StoreEvent::SendFailed { peer, reason } => {
                    warn!(%node, %peer, "send failed: {reason}")
                }
                StoreEvent::PersistFailed { reason } => warn!(%node, "persist failed: {reason}"),
                other => debug!(%node, ?other, "store event"),
            }
        }
    })
}
