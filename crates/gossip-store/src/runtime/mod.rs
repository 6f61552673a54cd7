//! Store runtime: the live store, its background tasks and its handle.
//!
//! `GossipStore::open` loads persisted state, then spawns three tasks:
//! fan-out (sends accepted payloads to capable peers), persister (debounced
//! snapshot writes) and sweeper (periodic TTL expiry). The application and
//! the transport talk to it through a cloneable [`StoreHandle`].
//!
//! Only the hash index sits behind a mutex. Decoding, hashing and encoding
//! run outside it, and every notification is a non-blocking channel send.
pub(crate) mod effect;
mod executor;
mod fanout;
mod persister;
mod sweeper;
pub mod transport;

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::capability::{can_receive, CapabilitySet};
use crate::config::StoreConfig;
use crate::error::GossipStoreError;
use crate::ingest::{self, Admission, Outcome, RejectReason};
use crate::metrics::{MetricsSnapshot, StoreMetrics};
use crate::payload::{HashedPayload, Payload, PayloadKind};
use crate::peers::PeerTable;
use crate::persistence::{restore_into, PersistenceBackend};
use crate::store::{PayloadStore, StoreEntry};
use crate::types::{Clock, DomainHash, PeerId};
use crate::wire;

use effect::StoreEffect;
use executor::execute_effects;
use fanout::FanoutJob;
use persister::PersistCommand;

pub use transport::{ChannelNetwork, ChannelTransport, InboundMessage, Transport};

/// Capacity of the persister command queue.
const PERSIST_QUEUE: usize = 256;

// ── Events (runtime → app) ────────────────────────────────────────────

/// Store-level events for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A payload was accepted. `origin` is `None` for local adds.
    Added {
        hash: DomainHash,
        kind: PayloadKind,
        sequence: u64,
        origin: Option<PeerId>,
    },
    /// Removed by the sweeper.
    Expired { hash: DomainHash, sequence: u64 },
    /// Removed to make room (capacity bound).
    Evicted { hash: DomainHash, sequence: u64 },
    SendFailed { peer: PeerId, reason: String },
    PersistFailed { reason: String },
}

// ── Shared state ──────────────────────────────────────────────────────

pub(crate) struct Shared {
    pub(crate) config: StoreConfig,
    pub(crate) store: Mutex<PayloadStore>,
    pub(crate) peers: RwLock<PeerTable>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) backend: Arc<Mutex<Box<dyn PersistenceBackend>>>,
    pub(crate) metrics: StoreMetrics,
    pub(crate) fanout_tx: mpsc::Sender<FanoutJob>,
    pub(crate) persist_tx: mpsc::Sender<PersistCommand>,
    pub(crate) event_tx: mpsc::Sender<StoreEvent>,
    pub(crate) lazy_tx: broadcast::Sender<Arc<Payload>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Owned by handles only. The tasks hold `Arc<Shared>`, so the last handle
/// going away is what stops them; they then release `Shared`, which closes
/// the lazy channel for consumers.
struct Lifecycle {
    shutdown_tx: watch::Sender<bool>,
}

impl Lifecycle {
    fn signal(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.signal();
    }
}

// ── StoreHandle ───────────────────────────────────────────────────────

/// Cloneable handle to a running store.
#[derive(Clone)]
pub struct StoreHandle {
    shared: Arc<Shared>,
    lifecycle: Arc<Lifecycle>,
}

impl StoreHandle {
    /// Add a locally originated payload. Skips decode and the capability check.
    pub fn add(&self, payload: Payload) -> Outcome {
        self.admit(HashedPayload::new(payload), None)
    }

    /// Inbound bytes from a peer.
    ///
    /// Registers the peer with `capabilities` if it is not known yet. A peer
    /// already known keeps the set from its last capability exchange.
    pub fn on_peer_message(&self, peer: &PeerId, capabilities: &CapabilitySet, bytes: &[u8]) -> Outcome {
        if self.shared.peers.write().observe(peer, capabilities) {
            debug!(%peer, "peer registered from inbound message");
        }

        match ingest::prepare_inbound(bytes, &self.shared.config.local_capabilities) {
            Ok(payload) => self.admit(payload, Some(peer)),
            Err(reason) => {
                self.count_rejection(&reason);
                debug!(%peer, "dropping inbound payload: {reason}");
                Outcome::Rejected(reason)
            }
        }
    }

    /// Replace a peer's capability set (capability exchange).
    pub fn on_peer_capabilities_changed(&self, peer: PeerId, capabilities: CapabilitySet) {
        debug!(%peer, capabilities = capabilities.len(), "peer capabilities updated");
        self.shared.peers.write().set(peer, capabilities);
    }

    /// Forget a peer. Entries it delivered stay.
    pub fn on_peer_disconnected(&self, peer: &PeerId) {
        if self.shared.peers.write().remove(peer).is_some() {
            debug!(%peer, "peer disconnected");
        }
    }

    /// Encoded envelopes for a newly joined peer, in sequence order, limited
    /// to what the peer's advertised capabilities allow. Unknown peer: empty.
    pub fn request_full_sync(&self, peer: &PeerId) -> Vec<Bytes> {
        let Some(capabilities) = self.shared.peers.read().get(peer).cloned() else {
            debug!(%peer, "full sync requested by unknown peer");
            return Vec::new();
        };
        let snapshot = self.shared.store.lock().snapshot();

        snapshot
            .iter()
            .filter(|entry| can_receive(&entry.payload, &capabilities))
            .filter_map(|entry| match wire::encode(&entry.payload) {
                Ok(bytes) => Some(Bytes::from(bytes)),
                Err(e) => {
                    warn!(hash = %entry.hash, "cannot encode payload for sync: {e}");
                    None
                }
            })
            .collect()
    }

    pub fn lookup(&self, hash: &DomainHash) -> Option<StoreEntry> {
        self.shared.store.lock().lookup(hash).cloned()
    }

    pub fn contains(&self, hash: &DomainHash) -> bool {
        self.shared.store.lock().contains(hash)
    }

    pub fn len(&self) -> usize {
        self.shared.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.store.lock().is_empty()
    }

    /// Point-in-time copy of every entry, in sequence order.
    pub fn snapshot(&self) -> Vec<StoreEntry> {
        self.shared.store.lock().snapshot()
    }

    /// Payloads matching `predicate`, lazily filtered over a snapshot.
    pub fn query_all<F>(&self, predicate: F) -> impl Iterator<Item = Arc<Payload>>
    where
        F: Fn(&Payload) -> bool,
    {
        self.snapshot()
            .into_iter()
            .map(|entry| entry.payload)
            .filter(move |payload| predicate(payload))
    }

    /// Receive lazily processed payloads accepted from now on.
    pub fn subscribe_lazy(&self) -> broadcast::Receiver<Arc<Payload>> {
        self.shared.lazy_tx.subscribe()
    }

    pub fn peer_count(&self) -> usize {
        self.shared.peers.read().len()
    }

    pub fn local_capabilities(&self) -> &CapabilitySet {
        &self.shared.config.local_capabilities
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Run an expiry sweep now instead of waiting for the next tick.
    pub async fn sweep_now(&self) -> usize {
        sweeper::sweep(&self.shared).await
    }

    /// Wait for queued broadcasts, then write the store to the backend.
    pub async fn flush(&self) -> Result<(), GossipStoreError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.shared
            .fanout_tx
            .send(FanoutJob::Barrier(done_tx))
            .await
            .map_err(|_| GossipStoreError::Shutdown)?;
        done_rx.await.map_err(|_| GossipStoreError::Shutdown)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.shared
            .persist_tx
            .send(PersistCommand::Flush(reply_tx))
            .await
            .map_err(|_| GossipStoreError::Shutdown)?;
        reply_rx.await.map_err(|_| GossipStoreError::Shutdown)?
    }

    /// Flush, stop the background tasks and wait for them.
    ///
    /// Dropping every handle also stops the tasks (the persister still
    /// writes pending changes), but without waiting.
    pub async fn shutdown(&self) -> Result<(), GossipStoreError> {
        let flushed = self.flush().await;
        self.lifecycle.signal();
        let tasks = std::mem::take(&mut *self.shared.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                warn!("store task ended abnormally: {e}");
            }
        }
        info!("gossip store shut down");
        flushed
    }

    fn admit(&self, payload: HashedPayload, origin: Option<&PeerId>) -> Outcome {
        let now = self.shared.clock.now_ms();
        let Admission { outcome, effects } = {
            let mut store = self.shared.store.lock();
            ingest::admit(&mut store, payload, origin, now)
        };

        match &outcome {
            Outcome::Added => self.shared.metrics.added.inc(),
            Outcome::DuplicateIgnored => self.shared.metrics.duplicates.inc(),
            Outcome::Rejected(reason) => self.count_rejection(reason),
        }
        let evictions = effects
            .iter()
            .filter(|e| matches!(e, StoreEffect::Emit(StoreEvent::Evicted { .. })))
            .count();
        if evictions > 0 {
            self.shared.metrics.capacity_evictions.inc_by(evictions as u64);
            debug!(evictions, "store full, oldest entries evicted");
        }

        execute_effects(&self.shared, effects);
        outcome
    }

    fn count_rejection(&self, reason: &RejectReason) {
        let counter = match reason {
            RejectReason::Decode(_) => &self.shared.metrics.rejected_decode,
            RejectReason::UnsupportedCapability => &self.shared.metrics.rejected_capability,
            RejectReason::Expired => &self.shared.metrics.rejected_expired,
        };
        counter.inc();
    }
}

// ── StoreChannels ─────────────────────────────────────────────────────

/// Returned to the application when the store opens.
pub struct StoreChannels {
    pub handle: StoreHandle,
    /// Store events. Dropped when full; drain it or drop it.
    pub events: mpsc::Receiver<StoreEvent>,
}

// ── GossipStore ───────────────────────────────────────────────────────

pub struct GossipStore;

impl GossipStore {
    /// Load persisted state, then start the background tasks.
    ///
    /// Must be called from within a tokio runtime. Returns only once the
    /// persisted snapshot is restored, so no traffic races the reload.
    pub async fn open<B: PersistenceBackend>(
        config: StoreConfig,
        backend: B,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<StoreChannels, GossipStoreError> {
        config.validate()?;

        let backend: Box<dyn PersistenceBackend> = Box::new(backend);
        let backend = Arc::new(Mutex::new(backend));
        let persisted = {
            let backend = backend.clone();
            tokio::task::spawn_blocking(move || backend.lock().load())
            .await
            .map_err(|e| GossipStoreError::PersistenceLoadFailed {
                reason: e.to_string(),
            })??
        };

        let mut store = PayloadStore::new(config.max_entries);
        let report = restore_into(&mut store, persisted, clock.now_ms());
        info!(
            restored = report.restored,
            expired = report.expired,
            undecodable = report.undecodable,
            duplicates = report.duplicates,
            next_sequence = store.next_sequence(),
            "gossip store loaded"
        );

        let (fanout_tx, fanout_rx) = mpsc::channel(config.fanout_queue);
        let (persist_tx, persist_rx) = mpsc::channel(PERSIST_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(config.event_queue);
        let (lazy_tx, _) = broadcast::channel(config.lazy_queue);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(Shared {
            config,
            store: Mutex::new(store),
            peers: RwLock::new(PeerTable::new()),
            clock,
            backend,
            metrics: StoreMetrics::default(),
            fanout_tx,
            persist_tx,
            event_tx,
            lazy_tx,
            tasks: Mutex::new(Vec::new()),
        });

        let tasks = vec![
            tokio::spawn(fanout::run(
                shared.clone(),
                transport,
                fanout_rx,
                shutdown_rx.clone(),
            )),
            tokio::spawn(persister::run(shared.clone(), persist_rx, shutdown_rx.clone())),
            tokio::spawn(sweeper::run(shared.clone(), shutdown_rx)),
        ];
        *shared.tasks.lock() = tasks;

        if report.needs_compaction() {
            execute_effects(&shared, vec![StoreEffect::Persist { compact: true }]);
        }

        Ok(StoreChannels {
            handle: StoreHandle {
                shared,
                lifecycle: Arc::new(Lifecycle { shutdown_tx }),
            },
            events: event_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::transport::mock::MockTransport;
    use super::*;
    use crate::capability::{ACCOUNT_AGE_WITNESS, TRADE_STATISTICS};
    use crate::payload::{AccountAgeWitness, Direction, OfferSummary, TradeStatistics};
    use crate::persistence::MemoryBackend;
    use crate::types::{ManualClock, OwnerKey};

    const NOW: u64 = 1_700_000_000_000;

    fn trade(owner: u8) -> Payload {
        let offer = OfferSummary {
            id: "abc".into(),
            direction: Direction::Buy,
            base_currency: "BTC".into(),
            counter_currency: "USD".into(),
            payment_method_id: "SEPA".into(),
            date: NOW,
            use_market_based_price: false,
            market_price_margin: 0.0,
            amount: 100_000,
            min_amount: 100_000,
        };
        TradeStatistics::from_offer(&offer, 1_000_000, 100_000, NOW, "tx1", OwnerKey::from_bytes([owner; 32]))
            .into()
    }

    fn witness(seed: u8) -> Payload {
        AccountAgeWitness::new(vec![seed; 20], NOW, OwnerKey::from_bytes([seed; 32])).into()
    }

    async fn open(transport: MockTransport) -> StoreChannels {
        GossipStore::open(
            StoreConfig::default(),
            MemoryBackend::new(),
            Arc::new(transport),
            Arc::new(ManualClock::new(NOW)),
        )
        .await
        .unwrap()
    }

    fn caps(ids: &[crate::capability::CapabilityId]) -> CapabilitySet {
        ids.iter().copied().collect()
    }

    #[tokio::test]
    async fn broadcast_respects_capabilities() {
        let transport = MockTransport::new();
        let StoreChannels { handle, .. } = open(transport.clone()).await;
        handle.on_peer_capabilities_changed("full".into(), caps(&[TRADE_STATISTICS, ACCOUNT_AGE_WITNESS]));
        handle.on_peer_capabilities_changed("witness-only".into(), caps(&[ACCOUNT_AGE_WITNESS]));

        assert_eq!(handle.add(trade(1)), Outcome::Added);
        assert_eq!(handle.add(witness(1)), Outcome::Added);
        handle.flush().await.unwrap();

        assert_eq!(transport.sent_to(&"full".into()).len(), 2);
        let witness_only = transport.sent_to(&"witness-only".into());
        assert_eq!(witness_only.len(), 1);
        assert_eq!(wire::decode(&witness_only[0]).unwrap(), witness(1));
    }

    #[tokio::test]
    async fn inbound_is_not_echoed_to_origin() {
        let transport = MockTransport::new();
        let StoreChannels { handle, .. } = open(transport.clone()).await;
        let all = CapabilitySet::all_known();
        handle.on_peer_capabilities_changed("b".into(), all.clone());

        let bytes = wire::encode(&trade(1)).unwrap();
        assert_eq!(handle.on_peer_message(&"a".into(), &all, &bytes), Outcome::Added);
        handle.flush().await.unwrap();

        assert!(transport.sent_to(&"a".into()).is_empty());
        assert_eq!(transport.sent_to(&"b".into()).len(), 1);
        assert_eq!(handle.peer_count(), 2);
    }

    #[tokio::test]
    async fn duplicate_inbound_is_not_rebroadcast() {
        let transport = MockTransport::new();
        let StoreChannels { handle, .. } = open(transport.clone()).await;
        handle.on_peer_capabilities_changed("b".into(), CapabilitySet::all_known());

        let all = CapabilitySet::all_known();
        handle.on_peer_message(&"a".into(), &all, &wire::encode(&trade(1)).unwrap());
        let outcome = handle.on_peer_message(&"c".into(), &all, &wire::encode(&trade(2)).unwrap());
        assert_eq!(outcome, Outcome::DuplicateIgnored);
        handle.flush().await.unwrap();

        // One broadcast, reaching "b" and "c" (known by the time it ran).
        assert_eq!(transport.sent_to(&"b".into()).len(), 1);
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(handle.metrics().duplicates, 1);
    }

    #[tokio::test]
    async fn failed_send_skips_only_that_peer() {
        let transport = MockTransport::new();
        transport.fail_peer("bad".into());
        let StoreChannels { handle, mut events } = open(transport.clone()).await;
        handle.on_peer_capabilities_changed("bad".into(), CapabilitySet::all_known());
        handle.on_peer_capabilities_changed("good".into(), CapabilitySet::all_known());

        handle.add(witness(1));
        handle.flush().await.unwrap();

        assert_eq!(transport.sent_to(&"good".into()).len(), 1);
        let metrics = handle.metrics();
        assert_eq!(metrics.sends_ok, 1);
        assert_eq!(metrics.sends_failed, 1);

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            if let StoreEvent::SendFailed { peer, .. } = event {
                assert_eq!(peer, PeerId::from("bad"));
                saw_failure = true;
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn full_sync_is_filtered_and_ordered() {
        let StoreChannels { handle, .. } = open(MockTransport::new()).await;
        handle.add(witness(1));
        handle.add(trade(1));
        handle.add(witness(2));

        assert!(handle.request_full_sync(&"stranger".into()).is_empty());

        handle.on_peer_capabilities_changed("w".into(), caps(&[ACCOUNT_AGE_WITNESS]));
        let sync: Vec<Payload> = handle
            .request_full_sync(&"w".into())
            .iter()
            .map(|b| wire::decode(b).unwrap())
            .collect();
        assert_eq!(sync, vec![witness(1), witness(2)]);

        handle.on_peer_capabilities_changed("all".into(), CapabilitySet::all_known());
        assert_eq!(handle.request_full_sync(&"all".into()).len(), 3);
    }

    #[tokio::test]
    async fn lazy_consumers_get_trade_statistics_only() {
        let StoreChannels { handle, .. } = open(MockTransport::new()).await;
        let mut lazy = handle.subscribe_lazy();
        handle.add(witness(1));
        handle.add(trade(1));
        let payload = lazy.recv().await.unwrap();
        assert_eq!(*payload, trade(1));
        assert!(lazy.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsupported_local_capability_rejects_inbound() {
        let config = StoreConfig {
            local_capabilities: caps(&[ACCOUNT_AGE_WITNESS]),
            ..StoreConfig::default()
        };
        let StoreChannels { handle, .. } = GossipStore::open(
            config,
            MemoryBackend::new(),
            Arc::new(MockTransport::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .await
        .unwrap();

        let bytes = wire::encode(&trade(1)).unwrap();
        let outcome = handle.on_peer_message(&"a".into(), &CapabilitySet::all_known(), &bytes);
        assert_eq!(outcome, Outcome::Rejected(RejectReason::UnsupportedCapability));
        assert!(handle.is_empty());
        // Local adds skip the check.
        assert_eq!(handle.add(trade(1)), Outcome::Added);
    }

    #[tokio::test]
    async fn query_all_filters_lazily() {
        let StoreChannels { handle, .. } = open(MockTransport::new()).await;
        handle.add(witness(1));
        handle.add(trade(1));
        let trades: Vec<_> = handle
            .query_all(|p| p.as_trade_statistics().is_some())
            .collect();
        assert_eq!(trades.len(), 1);
        assert_eq!(handle.query_all(|_| true).count(), 2);
    }

    #[tokio::test]
    async fn shutdown_flushes_and_stops() {
        let backend = MemoryBackend::new();
        let StoreChannels { handle, .. } = GossipStore::open(
            StoreConfig::default(),
            backend.clone(),
            Arc::new(MockTransport::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .await
        .unwrap();
        handle.add(witness(1));
        handle.shutdown().await.unwrap();
        assert_eq!(backend.records().len(), 1);
        assert!(matches!(handle.flush().await, Err(GossipStoreError::Shutdown)));
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_store() {
        let backend = MemoryBackend::new();
        let StoreChannels { handle, events } = GossipStore::open(
            StoreConfig::default(),
            backend.clone(),
            Arc::new(MockTransport::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .await
        .unwrap();
        let aggregator = crate::stats::TradeStatsAggregator::new();
        let consumer = aggregator.spawn(handle.subscribe_lazy());

        let clone = handle.clone();
        handle.add(trade(1));
        drop(events);
        drop(handle);
        // A surviving clone keeps the store running.
        assert_eq!(clone.add(witness(1)), Outcome::Added);
        drop(clone);

        tokio::time::timeout(std::time::Duration::from_secs(2), consumer)
            .await
            .expect("lazy consumer sees the channel close")
            .unwrap();
        assert_eq!(aggregator.market("BTC/USD").unwrap().trades, 1);
        // Pending changes were written on the way out.
        assert_eq!(backend.records().len(), 2);
    }

    #[tokio::test]
    async fn invalid_config_fails_open() {
        let config = StoreConfig {
            max_entries: 0,
            ..StoreConfig::default()
        };
        let result = GossipStore::open(
            config,
            MemoryBackend::new(),
            Arc::new(MockTransport::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .await;
        assert!(matches!(result, Err(GossipStoreError::Config(_))));
    }
}
