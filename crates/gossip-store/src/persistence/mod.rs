/// Durable snapshot of the store.
///
/// The persisted layout is an ordered list of
/// `{sequence, type_discriminant, version, body, received_at}` records, the
/// same body encoding as the wire, plus the sequence high-water mark. Reload
/// replays records in sequence order and re-runs only the TTL check:
/// payloads were validated when first accepted. Sequence numbers of entries
/// that expired during downtime are never issued again.
mod memory;
mod sqlite;

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GossipStoreError;
use crate::store::{PayloadStore, StoreEntry};
use crate::wire::{self, DecodeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub sequence: u64,
    pub type_discriminant: u16,
    pub version: u16,
    pub body: Vec<u8>,
    pub received_at: u64,
}

impl PersistedRecord {
    pub fn from_entry(entry: &StoreEntry) -> Result<Self, GossipStoreError> {
        let envelope = wire::to_envelope(&entry.payload)?;
        Ok(Self {
            sequence: entry.sequence,
            type_discriminant: envelope.type_discriminant,
            version: envelope.version,
            body: envelope.body,
            received_at: entry.received_at,
        })
    }

    /// Decode back into an entry. The domain hash is recomputed, not stored.
    pub fn to_entry(&self) -> Result<StoreEntry, DecodeError> {
        let payload = wire::from_parts(self.type_discriminant, self.version, &self.body)?;
        Ok(StoreEntry {
            hash: payload.domain_hash(),
            payload: payload.into(),
            received_at: self.received_at,
            sequence: self.sequence,
        })
    }
}

/// Everything a backend stores: the records and the next sequence to issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    /// Sequence the next insert receives. 0 when never written.
    pub next_sequence: u64,
    pub records: Vec<PersistedRecord>,
}

/// Storage for persisted snapshots.
///
/// Methods block; the runtime calls them from `spawn_blocking`.
pub trait PersistenceBackend: Send + 'static {
    fn load(&mut self) -> Result<PersistedSnapshot, GossipStoreError>;

    /// Replace the stored snapshot atomically, records and high-water mark together.
    fn save(&mut self, snapshot: &PersistedSnapshot) -> Result<(), GossipStoreError>;

    /// Reclaim space after removals.
    fn compact(&mut self) -> Result<(), GossipStoreError> {
        Ok(())
    }
}

/// What a reload did with the persisted records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub expired: usize,
    pub undecodable: usize,
    pub duplicates: usize,
}

impl RestoreReport {
    /// Whether the persisted snapshot holds records that were not restored.
    pub fn needs_compaction(&self) -> bool {
        self.expired + self.undecodable + self.duplicates > 0
    }
}

/// Replay a persisted snapshot into an empty store.
pub fn restore_into(store: &mut PayloadStore, snapshot: PersistedSnapshot, now: u64) -> RestoreReport {
    let PersistedSnapshot {
        next_sequence,
        mut records,
    } = snapshot;
    records.sort_by_key(|r| r.sequence);
    let mut report = RestoreReport::default();

    for record in records {
        let entry = match record.to_entry() {
            Ok(entry) => entry,
            Err(e) => {
                warn!(sequence = record.sequence, "dropping undecodable persisted record: {e}");
                report.undecodable += 1;
                continue;
            }
        };
        if entry.is_expired(now) {
            debug!(sequence = record.sequence, hash = %entry.hash, "persisted record expired during downtime");
            report.expired += 1;
            continue;
        }
        if store.restore(entry) {
            report.restored += 1;
        } else {
            report.duplicates += 1;
        }
    }
    store.resume_sequence(next_sequence);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{AccountAgeWitness, HashedPayload, PayloadKind};
    use crate::types::OwnerKey;

    const DAY: u64 = 24 * 60 * 60 * 1000;

    fn record(seed: u8, sequence: u64, received_at: u64) -> PersistedRecord {
        let payload = HashedPayload::new(
            AccountAgeWitness::new(vec![seed; 20], 0, OwnerKey::from_bytes([seed; 32])).into(),
        );
        let (hash, payload) = payload.into_parts();
        PersistedRecord::from_entry(&StoreEntry {
            payload,
            hash,
            received_at,
            sequence,
        })
        .unwrap()
    }

    fn snapshot(records: Vec<PersistedRecord>) -> PersistedSnapshot {
        PersistedSnapshot {
            next_sequence: 0,
            records,
        }
    }

    #[test]
    fn record_roundtrips_entry() {
        let rec = record(1, 7, 100);
        let entry = rec.to_entry().unwrap();
        assert_eq!(entry.sequence, 7);
        assert_eq!(entry.received_at, 100);
        assert_eq!(PersistedRecord::from_entry(&entry).unwrap(), rec);
    }

    #[test]
    fn restore_replays_in_sequence_order() {
        let mut store = PayloadStore::new(100);
        let report = restore_into(&mut store, snapshot(vec![record(2, 9, 0), record(1, 4, 0)]), 0);
        assert_eq!(report.restored, 2);
        assert!(!report.needs_compaction());
        let order: Vec<u64> = store.snapshot().iter().map(|e| e.sequence).collect();
        assert_eq!(order, vec![4, 9]);
        assert_eq!(store.next_sequence(), 10);
    }

    #[test]
    fn restore_skips_expired_and_undecodable() {
        let mut store = PayloadStore::new(100);
        let garbage = PersistedRecord {
            sequence: 3,
            type_discriminant: PayloadKind::TradeStatistics.discriminant(),
            version: 1,
            body: vec![0xc1],
            received_at: 0,
        };
        let records = vec![record(1, 1, 0), record(2, 2, 10 * DAY), garbage];
        let report = restore_into(&mut store, snapshot(records), 60 * DAY + 1);
        assert_eq!(
            report,
            RestoreReport {
                restored: 1,
                expired: 1,
                undecodable: 1,
                duplicates: 0
            }
        );
        assert!(report.needs_compaction());
        assert_eq!(store.snapshot()[0].sequence, 2);
    }

    #[test]
    fn restore_counts_duplicate_hashes() {
        let mut store = PayloadStore::new(100);
        let report = restore_into(&mut store, snapshot(vec![record(1, 1, 0), record(1, 2, 0)]), 0);
        assert_eq!(report.restored, 1);
        assert_eq!(report.duplicates, 1);
    }

    #[test]
    fn sequences_of_expired_records_are_not_reissued() {
        let mut store = PayloadStore::new(100);
        let persisted = PersistedSnapshot {
            next_sequence: 3,
            records: vec![record(1, 1, 50 * DAY), record(2, 2, 0)],
        };
        let report = restore_into(&mut store, persisted, 61 * DAY);
        assert_eq!(report.expired, 1);
        assert_eq!(store.next_sequence(), 3);
    }
}
