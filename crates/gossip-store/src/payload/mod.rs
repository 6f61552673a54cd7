/// Payload variants: the records distributed through the store.
///
/// `Payload` is a closed set. Each variant implements [`StoragePayload`],
/// which fixes its TTL, owner key, required capabilities and, most
/// importantly, its canonical projection: the subset of fields that
/// identifies "the same fact". Two payloads with equal projections are
/// duplicates even if other fields differ.
///
/// Adding a variant: implement `StoragePayload`, add it to `Payload`, and
/// register its decoder in `wire::REGISTRY`.
pub mod account_age_witness;
pub mod trade_statistics;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::capability::CapabilityId;
use crate::types::{duration_ms, DomainHash, OwnerKey};

pub use account_age_witness::AccountAgeWitness;
pub use trade_statistics::{Direction, OfferSummary, TradeStatistics};

/// Type discriminant written into the wire envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    TradeStatistics,
    AccountAgeWitness,
}

impl PayloadKind {
    pub const fn discriminant(self) -> u16 {
        match self {
            PayloadKind::TradeStatistics => 1,
            PayloadKind::AccountAgeWitness => 2,
        }
    }
}

/// Contract every payload variant honors.
pub trait StoragePayload: Serialize + DeserializeOwned {
    const KIND: PayloadKind;
    /// Body version written by this build.
    const VERSION: u16;

    /// Maximum retention, measured from receipt.
    fn ttl(&self) -> Duration;

    fn owner_key(&self) -> &OwnerKey;

    /// Capabilities a peer must advertise to receive this payload.
    fn required_capabilities(&self) -> &'static [CapabilityId];

    /// Timestamp the payload declares for itself, if any. Used to reject
    /// replays that are already older than their TTL on arrival.
    fn declared_at(&self) -> Option<u64> {
        None
    }

    /// Whether accepted payloads go to the lazy-consumer queue.
    fn lazily_processed(&self) -> bool {
        false
    }

    /// Write the fields that identify the fact. Must be deterministic.
    fn project(&self, out: &mut Projection);
}

/// Builder for canonical projection bytes.
///
/// Every field is length- or width-prefixed so adjacent fields cannot
/// run into each other.
#[derive(Debug)]
pub struct Projection {
    buf: Vec<u8>,
}

impl Projection {
    fn new(kind: PayloadKind) -> Self {
        let mut buf = Vec::with_capacity(128);
        buf.extend_from_slice(&kind.discriminant().to_be_bytes());
        Self { buf }
    }

    pub fn str(&mut self, value: &str) -> &mut Self {
        self.bytes(value.as_bytes())
    }

    pub fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(&(value.len() as u64).to_be_bytes());
        self.buf.extend_from_slice(value);
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(value as u8)
    }

    /// Bitwise: `-0.0` and `0.0` differ, every NaN is the same NaN.
    pub fn f64(&mut self, value: f64) -> &mut Self {
        let bits = if value.is_nan() {
            f64::NAN.to_bits()
        } else {
            value.to_bits()
        };
        self.u64(bits)
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// A payload of any registered variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    TradeStatistics(TradeStatistics),
    AccountAgeWitness(AccountAgeWitness),
}

macro_rules! dispatch {
    ($self:expr, $p:ident => $e:expr) => {
        match $self {
            $crate::payload::Payload::TradeStatistics($p) => $e,
            $crate::payload::Payload::AccountAgeWitness($p) => $e,
        }
    };
}
pub(crate) use dispatch;

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::TradeStatistics(_) => PayloadKind::TradeStatistics,
            Payload::AccountAgeWitness(_) => PayloadKind::AccountAgeWitness,
        }
    }

    pub fn ttl(&self) -> Duration {
        dispatch!(self, p => p.ttl())
    }

    pub fn ttl_ms(&self) -> u64 {
        duration_ms(self.ttl())
    }

    pub fn owner_key(&self) -> &OwnerKey {
        dispatch!(self, p => p.owner_key())
    }

    pub fn required_capabilities(&self) -> &'static [CapabilityId] {
        dispatch!(self, p => p.required_capabilities())
    }

    pub fn declared_at(&self) -> Option<u64> {
        dispatch!(self, p => p.declared_at())
    }

    pub fn lazily_processed(&self) -> bool {
        dispatch!(self, p => p.lazily_processed())
    }

    /// Canonical projection bytes, prefixed with the kind discriminant.
    pub fn projection(&self) -> Vec<u8> {
        let mut out = Projection::new(self.kind());
        dispatch!(self, p => p.project(&mut out));
        out.finish()
    }

    /// Deduplication identity.
    pub fn domain_hash(&self) -> DomainHash {
        DomainHash::from_bytes(Sha256::digest(self.projection()).into())
    }

    /// Domain equality: same variant and same canonical projection.
    pub fn same_fact(&self, other: &Payload) -> bool {
        self.projection() == other.projection()
    }

    /// Whether the payload's own timestamp is already older than its TTL.
    pub fn is_stale(&self, now: u64) -> bool {
        match self.declared_at() {
            Some(at) => now.saturating_sub(at) > self.ttl_ms(),
            None => false,
        }
    }

    pub fn as_trade_statistics(&self) -> Option<&TradeStatistics> {
        match self {
            Payload::TradeStatistics(stats) => Some(stats),
            _ => None,
        }
    }
}

impl From<TradeStatistics> for Payload {
    fn from(stats: TradeStatistics) -> Self {
        Payload::TradeStatistics(stats)
    }
}

impl From<AccountAgeWitness> for Payload {
    fn from(witness: AccountAgeWitness) -> Self {
        Payload::AccountAgeWitness(witness)
    }
}

/// A payload with its domain hash computed once, outside any lock.
#[derive(Debug, Clone)]
pub struct HashedPayload {
    hash: DomainHash,
    payload: Arc<Payload>,
}

impl HashedPayload {
    pub fn new(payload: Payload) -> Self {
        let hash = payload.domain_hash();
        Self {
            hash,
            payload: Arc::new(payload),
        }
    }

    pub fn hash(&self) -> DomainHash {
        self.hash
    }

    pub fn payload(&self) -> &Arc<Payload> {
        &self.payload
    }

    pub fn into_parts(self) -> (DomainHash, Arc<Payload>) {
        (self.hash, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OwnerKey;

    fn witness(hash: &[u8], date: u64, owner: u8) -> Payload {
        AccountAgeWitness::new(hash.to_vec(), date, OwnerKey::from_bytes([owner; 32])).into()
    }

    #[test]
    fn projection_prefixes_fields() {
        let mut a = Projection::new(PayloadKind::TradeStatistics);
        a.str("ab").str("c");
        let mut b = Projection::new(PayloadKind::TradeStatistics);
        b.str("a").str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn projection_float_semantics() {
        let bits = |v: f64| {
            let mut p = Projection::new(PayloadKind::TradeStatistics);
            p.f64(v);
            p.finish()
        };
        assert_ne!(bits(0.0), bits(-0.0));
        assert_eq!(bits(f64::NAN), bits(-f64::NAN));
    }

    #[test]
    fn variants_never_share_a_hash() {
        let w = witness(b"abc", 1, 1);
        assert_eq!(w.projection()[..2], PayloadKind::AccountAgeWitness.discriminant().to_be_bytes());
    }

    #[test]
    fn owner_key_is_not_part_of_identity() {
        let a = witness(b"abc", 1, 1);
        let b = witness(b"abc", 1, 2);
        assert_ne!(a, b);
        assert!(a.same_fact(&b));
        assert_eq!(a.domain_hash(), b.domain_hash());
    }

    #[test]
    fn hashed_payload_keeps_hash() {
        let p = witness(b"xyz", 5, 1);
        let expected = p.domain_hash();
        let hashed = HashedPayload::new(p);
        assert_eq!(hashed.hash(), expected);
        let (hash, payload) = hashed.into_parts();
        assert_eq!(hash, payload.domain_hash());
    }
}
