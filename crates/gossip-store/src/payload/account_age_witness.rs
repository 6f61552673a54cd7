/// Account age witness: proof that a payment account existed at `date`.
///
/// Identity is the witness hash plus its date. The owner key is excluded
/// so a re-publication under a rotated key is still the same witness.
/// `date` describes the account, not the message, so it is not used for
/// stale-replay rejection.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{PayloadKind, Projection, StoragePayload};
use crate::capability::{CapabilityId, ACCOUNT_AGE_WITNESS};
use crate::types::OwnerKey;

pub const ACCOUNT_AGE_WITNESS_TTL: Duration = Duration::from_secs(60 * 24 * 60 * 60);

const REQUIRED_CAPABILITIES: &[CapabilityId] = &[ACCOUNT_AGE_WITNESS];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAgeWitness {
    /// Hash over the account data and salt (20 bytes in practice).
    pub hash: Vec<u8>,
    /// Unix ms.
    pub date: u64,
    pub owner_key: OwnerKey,
}

impl AccountAgeWitness {
    pub fn new(hash: Vec<u8>, date: u64, owner_key: OwnerKey) -> Self {
        Self {
            hash,
            date,
            owner_key,
        }
    }
}

impl StoragePayload for AccountAgeWitness {
    const KIND: PayloadKind = PayloadKind::AccountAgeWitness;
    const VERSION: u16 = 1;

    fn ttl(&self) -> Duration {
        ACCOUNT_AGE_WITNESS_TTL
    }

    fn owner_key(&self) -> &OwnerKey {
        &self.owner_key
    }

    fn required_capabilities(&self) -> &'static [CapabilityId] {
        REQUIRED_CAPABILITIES
    }

    fn project(&self, out: &mut Projection) {
        out.bytes(&self.hash).u64(self.date);
    }
}
