/// Ingestion pipeline: decode, capability check, dedup, TTL sanity, insert.
///
/// Split in two so the store lock covers only the index mutation:
/// [`prepare_inbound`] decodes and hashes without the lock, [`admit`] runs
/// dedup, TTL sanity and insert as one critical section and returns the
/// effects to execute once the lock is released.
use std::fmt;

use crate::capability::{can_receive, CapabilitySet};
use crate::payload::HashedPayload;
use crate::runtime::effect::StoreEffect;
use crate::runtime::StoreEvent;
use crate::store::{Insert, PayloadStore};
use crate::types::PeerId;
use crate::wire::{self, DecodeError};

/// The only results that cross the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Added,
    DuplicateIgnored,
    Rejected(RejectReason),
}

impl Outcome {
    pub fn is_added(&self) -> bool {
        matches!(self, Outcome::Added)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Decode(DecodeError),
    /// This node does not support a capability the payload requires.
    UnsupportedCapability,
    /// The payload's own timestamp is already past its TTL.
    Expired,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Decode(e) => write!(f, "decode: {e}"),
            RejectReason::UnsupportedCapability => f.write_str("unsupported capability"),
            RejectReason::Expired => f.write_str("expired"),
        }
    }
}

/// Lock-free half of inbound ingestion: decode, local capability check, hash.
pub fn prepare_inbound(
    bytes: &[u8],
    local_capabilities: &CapabilitySet,
) -> Result<HashedPayload, RejectReason> {
    let payload = wire::decode(bytes).map_err(RejectReason::Decode)?;
    if !can_receive(&payload, local_capabilities) {
        return Err(RejectReason::UnsupportedCapability);
    }
    Ok(HashedPayload::new(payload))
}

/// Result of [`admit`]: the outcome plus the effects to run after unlock.
#[derive(Debug)]
pub(crate) struct Admission {
    pub outcome: Outcome,
    pub effects: Vec<StoreEffect>,
}

/// Dedup, TTL sanity and insert. Call with the store lock held.
pub(crate) fn admit(
    store: &mut PayloadStore,
    payload: HashedPayload,
    origin: Option<&PeerId>,
    now: u64,
) -> Admission {
    if store.contains(&payload.hash()) {
        return Admission {
            outcome: Outcome::DuplicateIgnored,
            effects: vec![],
        };
    }
    if payload.payload().is_stale(now) {
        return Admission {
            outcome: Outcome::Rejected(RejectReason::Expired),
            effects: vec![],
        };
    }

    let Insert::Added { entry, evicted } = store.insert(payload, now) else {
        // Unreachable with the lock held: presence was checked above.
        return Admission {
            outcome: Outcome::DuplicateIgnored,
            effects: vec![],
        };
    };

    let mut effects = Vec::with_capacity(5);
    if let Some(old) = evicted {
        effects.push(StoreEffect::Emit(StoreEvent::Evicted {
            hash: old.hash,
            sequence: old.sequence,
        }));
    }
    effects.push(StoreEffect::Persist { compact: false });
    if entry.payload.lazily_processed() {
        effects.push(StoreEffect::Lazy(entry.payload.clone()));
    }
    effects.push(StoreEffect::Emit(StoreEvent::Added {
        hash: entry.hash,
        kind: entry.payload.kind(),
        sequence: entry.sequence,
        origin: origin.cloned(),
    }));
    effects.push(StoreEffect::Broadcast {
        entry,
        origin: origin.cloned(),
    });

    Admission {
        outcome: Outcome::Added,
        effects,
    }
}
