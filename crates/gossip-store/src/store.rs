/// PayloadStore: the hash index.
///
/// Pure state machine: one entry per domain hash, receipt-time TTL,
/// capacity bound. No I/O and no locking. The runtime wraps it in a mutex
/// and drives sweeps and persistence around it.
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::payload::{HashedPayload, Payload};
use crate::types::DomainHash;

/// One accepted payload. Never mutated once created.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub payload: Arc<Payload>,
    pub hash: DomainHash,
    /// Local receipt time (Unix ms).
    pub received_at: u64,
    /// Position in global insertion order.
    pub sequence: u64,
}

impl StoreEntry {
    /// Last instant at which the entry is still live.
    pub fn expires_at(&self) -> u64 {
        self.received_at.saturating_add(self.payload.ttl_ms())
    }

    /// `now - received_at > ttl`.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at()
    }
}

/// Result of [`PayloadStore::insert`].
#[derive(Debug)]
pub enum Insert {
    Added {
        entry: StoreEntry,
        /// Oldest entry pushed out to make room, if the store was full.
        evicted: Option<StoreEntry>,
    },
    Duplicate,
}

impl Insert {
    pub fn is_added(&self) -> bool {
        matches!(self, Insert::Added { .. })
    }
}

pub struct PayloadStore {
    entries: HashMap<DomainHash, StoreEntry>,
    /// Index: sequence → hash. Gives snapshot order and oldest-first eviction.
    by_sequence: BTreeMap<u64, DomainHash>,
    /// Index: (expires_at, sequence). Lets a sweep stop at the first live entry.
    expiry: BTreeSet<(u64, u64)>,
    next_sequence: u64,
    max_entries: usize,
}

impl PayloadStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            by_sequence: BTreeMap::new(),
            expiry: BTreeSet::new(),
            next_sequence: 1,
            max_entries: max_entries.max(1),
        }
    }

    pub fn lookup(&self, hash: &DomainHash) -> Option<&StoreEntry> {
        self.entries.get(hash)
    }

    pub fn contains(&self, hash: &DomainHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Insert a freshly received payload. Never overwrites.
    pub fn insert(&mut self, payload: HashedPayload, received_at: u64) -> Insert {
        let (hash, payload) = payload.into_parts();
        if self.entries.contains_key(&hash) {
            return Insert::Duplicate;
        }

        let evicted = if self.entries.len() >= self.max_entries {
            self.evict_oldest()
        } else {
            None
        };

        let entry = StoreEntry {
            payload,
            hash,
            received_at,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.index(entry.clone());
        Insert::Added { entry, evicted }
    }

    /// Re-insert a persisted entry, keeping its sequence.
    ///
    /// Returns false if the hash is already present. Entries must be
    /// restored in sequence order for capacity eviction to drop the oldest.
    pub fn restore(&mut self, entry: StoreEntry) -> bool {
        if self.entries.contains_key(&entry.hash) || self.by_sequence.contains_key(&entry.sequence) {
            return false;
        }
        if self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.next_sequence = self.next_sequence.max(entry.sequence + 1);
        self.index(entry);
        true
    }

    pub fn remove(&mut self, hash: &DomainHash) -> Option<StoreEntry> {
        let entry = self.entries.remove(hash)?;
        self.by_sequence.remove(&entry.sequence);
        self.expiry.remove(&(entry.expires_at(), entry.sequence));
        Some(entry)
    }

    /// Remove up to `limit` expired entries, earliest deadline first.
    pub fn remove_expired(&mut self, now: u64, limit: usize) -> Vec<StoreEntry> {
        let due: Vec<u64> = self
            .expiry
            .iter()
            .take_while(|(expires_at, _)| now > *expires_at)
            .take(limit)
            .map(|(_, sequence)| *sequence)
            .collect();

        due.into_iter()
            .filter_map(|sequence| {
                let hash = *self.by_sequence.get(&sequence)?;
                self.remove(&hash)
            })
            .collect()
    }


    /// All entries in sequence order.
    pub fn snapshot(&self) -> Vec<StoreEntry> {
        self.by_sequence
            .values()
            .filter_map(|hash| self.entries.get(hash).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence the next insert will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Continue from a persisted high-water mark. Never moves backwards.
    pub fn resume_sequence(&mut self, next: u64) {
        self.next_sequence = self.next_sequence.max(next);
    }

    fn index(&mut self, entry: StoreEntry) {
        self.by_sequence.insert(entry.sequence, entry.hash);
        self.expiry.insert((entry.expires_at(), entry.sequence));
        self.entries.insert(entry.hash, entry);
    }

    fn evict_oldest(&mut self) -> Option<StoreEntry> {
        let (_, hash) = self.by_sequence.first_key_value()?;
        let hash = *hash;
        self.remove(&hash)
    }
}
