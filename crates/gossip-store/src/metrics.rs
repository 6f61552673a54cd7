//! Store counters.
//!
//! [`Counter`] is a relaxed atomic; [`StoreMetrics`] groups the counters
//! every component bumps, and [`MetricsSnapshot`] is the serializable view
//! handed out by `StoreHandle::metrics()`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Monotonic counter. Relaxed ordering: values are statistics only.
#[derive(Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

#[derive(Debug, Default)]
pub struct StoreMetrics {
    pub added: Counter,
    pub duplicates: Counter,
    pub rejected_decode: Counter,
    pub rejected_capability: Counter,
    pub rejected_expired: Counter,
    pub expired: Counter,
    pub capacity_evictions: Counter,
    pub persist_ok: Counter,
    pub persist_failed: Counter,
    pub sends_ok: Counter,
    pub sends_failed: Counter,
    /// Fan-out jobs, events or lazy notifications dropped on a full queue.
    pub dropped: Counter,
}

impl StoreMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            added: self.added.get(),
            duplicates: self.duplicates.get(),
            rejected_decode: self.rejected_decode.get(),
            rejected_capability: self.rejected_capability.get(),
            rejected_expired: self.rejected_expired.get(),
            expired: self.expired.get(),
            capacity_evictions: self.capacity_evictions.get(),
            persist_ok: self.persist_ok.get(),
            persist_failed: self.persist_failed.get(),
            sends_ok: self.sends_ok.get(),
            sends_failed: self.sends_failed.get(),
            dropped: self.dropped.get(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub added: u64,
    pub duplicates: u64,
    pub rejected_decode: u64,
    pub rejected_capability: u64,
    pub rejected_expired: u64,
    pub expired: u64,
    pub capacity_evictions: u64,
    pub persist_ok: u64,
    pub persist_failed: u64,
    pub sends_ok: u64,
    pub sends_failed: u64,
    pub dropped: u64,
}

impl MetricsSnapshot {
    pub fn rejected(&self) -> u64 {
        self.rejected_decode + self.rejected_capability + self.rejected_expired
    }
}
