/// Wire envelope and decoder table.
///
/// On the wire every payload travels as
/// `WireEnvelope { type_discriminant, version, body }`, MessagePack-encoded.
/// The body is written as a named map (`rmp_serde::to_vec_named`), so a
/// reader ignores fields added by newer writers and defaults the ones
/// marked `#[serde(default)]`.
use serde::{Deserialize, Serialize};

use crate::error::GossipStoreError;
use crate::payload::{
    dispatch, AccountAgeWitness, Payload, PayloadKind, StoragePayload, TradeStatistics,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub type_discriminant: u16,
    pub version: u16,
    pub body: Vec<u8>,
}

impl WireEnvelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, GossipStoreError> {
        rmp_serde::to_vec(self).map_err(Into::into)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        rmp_serde::from_slice(data).map_err(|e| DecodeError::Envelope(e.to_string()))
    }
}

/// Why inbound bytes could not become a payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(String),

    #[error("unknown type discriminant {0}")]
    UnknownDiscriminant(u16),

    #[error("unsupported version {version} for {kind:?}")]
    UnsupportedVersion { kind: PayloadKind, version: u16 },

    #[error("malformed {kind:?} body: {reason}")]
    Body { kind: PayloadKind, reason: String },
}

struct DecoderEntry {
    kind: PayloadKind,
    /// Oldest body version this build can still read.
    min_version: u16,
    decode: fn(&[u8]) -> Result<Payload, rmp_serde::decode::Error>,
}

fn decode_body<P>(body: &[u8]) -> Result<Payload, rmp_serde::decode::Error>
where
    P: StoragePayload + Into<Payload>,
{
    rmp_serde::from_slice::<P>(body).map(Into::into)
}

/// One entry per registered variant.
static REGISTRY: &[DecoderEntry] = &[
    DecoderEntry {
        kind: PayloadKind::TradeStatistics,
        min_version: 1,
        decode: decode_body::<TradeStatistics>,
    },
    DecoderEntry {
        kind: PayloadKind::AccountAgeWitness,
        min_version: 1,
        decode: decode_body::<AccountAgeWitness>,
    },
];

fn lookup(discriminant: u16) -> Option<&'static DecoderEntry> {
    REGISTRY
        .iter()
        .find(|entry| entry.kind.discriminant() == discriminant)
}

fn version_of(payload: &Payload) -> u16 {
    fn v<P: StoragePayload>(_: &P) -> u16 {
        P::VERSION
    }
    dispatch!(payload, p => v(p))
}

/// Wrap a payload in its envelope.
pub fn to_envelope(payload: &Payload) -> Result<WireEnvelope, GossipStoreError> {
    let body = dispatch!(payload, p => rmp_serde::to_vec_named(p))?;
    Ok(WireEnvelope {
        type_discriminant: payload.kind().discriminant(),
        version: version_of(payload),
        body,
    })
}

/// Encode a payload to wire bytes.
pub fn encode(payload: &Payload) -> Result<Vec<u8>, GossipStoreError> {
    to_envelope(payload)?.to_bytes()
}

/// Decode the body of an already-parsed envelope.
pub fn from_envelope(envelope: &WireEnvelope) -> Result<Payload, DecodeError> {
    from_parts(envelope.type_discriminant, envelope.version, &envelope.body)
}

/// Decode a body given its discriminant and version.
pub fn from_parts(discriminant: u16, version: u16, body: &[u8]) -> Result<Payload, DecodeError> {
    let entry = lookup(discriminant).ok_or(DecodeError::UnknownDiscriminant(discriminant))?;
    if version < entry.min_version {
        return Err(DecodeError::UnsupportedVersion {
            kind: entry.kind,
            version,
        });
    }
    (entry.decode)(body).map_err(|e| DecodeError::Body {
        kind: entry.kind,
        reason: e.to_string(),
    })
}

/// Decode wire bytes into a payload.
pub fn decode(data: &[u8]) -> Result<Payload, DecodeError> {
    from_envelope(&WireEnvelope::from_bytes(data)?)
}
