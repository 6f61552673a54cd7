use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{PersistedRecord, PersistedSnapshot, PersistenceBackend};
use crate::error::GossipStoreError;

/// In-memory backend for tests and simulations.
///
/// Clones share state, so a test can keep one clone to inspect what the
/// runtime saved, flip failure injection, or reopen a store from it.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    snapshot: Arc<Mutex<PersistedSnapshot>>,
    fail_saves: Arc<AtomicBool>,
    saves: Arc<AtomicUsize>,
    compactions: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PersistedRecord> {
        self.snapshot.lock().records.clone()
    }

    /// Persisted high-water mark.
    pub fn next_sequence(&self) -> u64 {
        self.snapshot.lock().next_sequence
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn compaction_count(&self) -> usize {
        self.compactions.load(Ordering::SeqCst)
    }
}

impl PersistenceBackend for MemoryBackend {
    fn load(&mut self) -> Result<PersistedSnapshot, GossipStoreError> {
        Ok(self.snapshot.lock().clone())
    }

    fn save(&mut self, snapshot: &PersistedSnapshot) -> Result<(), GossipStoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(GossipStoreError::PersistenceWriteFailed {
                reason: "injected failure".into(),
            });
        }
        *self.snapshot.lock() = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn compact(&mut self) -> Result<(), GossipStoreError> {
        self.compactions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
