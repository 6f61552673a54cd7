/// Capability filter: which peers may receive which payloads.
///
/// Capabilities are opaque integers advertised by peers during the
/// capability-exchange handshake. Ids we do not know are kept as-is.
/// A peer that never advertised a capability is treated as lacking it.
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::payload::Payload;

/// Opaque capability identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(pub u32);

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cap#{}", self.0)
    }
}

/// Peer understands trade-statistics payloads.
pub const TRADE_STATISTICS: CapabilityId = CapabilityId(0);

/// Peer understands account-age-witness payloads.
pub const ACCOUNT_AGE_WITNESS: CapabilityId = CapabilityId(2);

/// Set of capabilities advertised by one peer (or supported locally).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<CapabilityId>);

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every capability this build knows how to handle.
    pub fn all_known() -> Self {
        [TRADE_STATISTICS, ACCOUNT_AGE_WITNESS].into_iter().collect()
    }

    pub fn insert(&mut self, cap: CapabilityId) -> bool {
        self.0.insert(cap)
    }

    pub fn remove(&mut self, cap: CapabilityId) -> bool {
        self.0.remove(&cap)
    }

    pub fn contains(&self, cap: CapabilityId) -> bool {
        self.0.contains(&cap)
    }

    /// Whether every capability in `required` is present.
    pub fn contains_all(&self, required: &[CapabilityId]) -> bool {
        required.iter().all(|cap| self.0.contains(cap))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CapabilityId> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<CapabilityId> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = CapabilityId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// `payload.required_capabilities ⊆ capabilities`.
pub fn can_receive(payload: &Payload, capabilities: &CapabilitySet) -> bool {
    capabilities.contains_all(payload.required_capabilities())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_all_of_empty_is_true() {
        assert!(CapabilitySet::new().contains_all(&[]));
    }

    #[test]
    fn contains_all_requires_every_member() {
        let caps: CapabilitySet = [TRADE_STATISTICS, CapabilityId(99)].into_iter().collect();
        assert!(caps.contains_all(&[TRADE_STATISTICS]));
        assert!(caps.contains_all(&[TRADE_STATISTICS, CapabilityId(99)]));
        assert!(!caps.contains_all(&[TRADE_STATISTICS, ACCOUNT_AGE_WITNESS]));
    }

    #[test]
    fn unknown_ids_are_kept_opaque() {
        let mut caps = CapabilitySet::new();
        assert!(caps.insert(CapabilityId(4242)));
        assert!(!caps.insert(CapabilityId(4242)));
        assert!(caps.contains(CapabilityId(4242)));
        assert_eq!(caps.len(), 1);
    }

    #[test]
    fn serializes_as_plain_list() {
        let caps: CapabilitySet = [ACCOUNT_AGE_WITNESS, TRADE_STATISTICS].into_iter().collect();
        assert_eq!(serde_json::to_string(&caps).unwrap(), "[0,2]");
    }
}
