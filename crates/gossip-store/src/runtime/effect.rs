use std::sync::Arc;

use crate::payload::Payload;
use crate::store::StoreEntry;
use crate::types::PeerId;

use super::StoreEvent;

/// Work produced under the store lock and executed after it is released.
///
/// Every effect is executed with `try_send`: a full queue drops the effect
/// and counts it, it never blocks ingestion.
#[derive(Debug)]
pub enum StoreEffect {
    /// Queue a fan-out of the entry to capable peers, skipping `origin`.
    Broadcast {
        entry: StoreEntry,
        origin: Option<PeerId>,
    },

    /// Mark the store dirty for the debounced persister.
    Persist { compact: bool },

    /// Hand a lazily processed payload to deferred consumers.
    Lazy(Arc<Payload>),

    /// Emit a store event to the application.
    Emit(StoreEvent),
}
