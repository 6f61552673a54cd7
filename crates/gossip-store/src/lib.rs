//! Gossip payload store.
//!
//! Receives typed payloads from peers or local actions, deduplicates them by
//! domain equality, expires them after a per-variant TTL, forwards them only
//! to peers whose capabilities allow it, and persists what survives.
//!
//! Wire format: MessagePack envelope `{type_discriminant, version, body}`.
//! Persistence: SQLite snapshot, debounced.

pub mod capability;
pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod payload;
pub mod peers;
pub mod persistence;
pub mod runtime;
pub mod stats;
pub mod store;
pub mod types;
pub mod wire;

pub use capability::{can_receive, CapabilityId, CapabilitySet, ACCOUNT_AGE_WITNESS, TRADE_STATISTICS};
pub use config::StoreConfig;
pub use error::GossipStoreError;
pub use ingest::{Outcome, RejectReason};
pub use metrics::MetricsSnapshot;
pub use payload::{
    AccountAgeWitness, Direction, HashedPayload, OfferSummary, Payload, PayloadKind, StoragePayload,
    TradeStatistics,
};
pub use persistence::{
    MemoryBackend, PersistedRecord, PersistedSnapshot, PersistenceBackend, SqliteBackend,
};
pub use runtime::{
    ChannelNetwork, ChannelTransport, GossipStore, InboundMessage, StoreChannels, StoreEvent,
    StoreHandle, Transport,
};
pub use stats::{MarketStats, TradeStatsAggregator};
pub use store::{PayloadStore, StoreEntry};
pub use types::{Clock, DomainHash, ManualClock, OwnerKey, PeerId, SystemClock};
pub use wire::{DecodeError, WireEnvelope};
