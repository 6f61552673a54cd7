/// Debounced persistence task.
///
/// A mutation marks the store dirty. The snapshot is written once the store
/// has been quiet for `persist_debounce`, or `persist_max_delay` after the
/// first unsaved mutation, whichever comes first. A failed or timed-out
/// write is logged and retried on the next trigger; ingestion never waits.
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::GossipStoreError;
use crate::persistence::{PersistedRecord, PersistedSnapshot};

use super::{Shared, StoreEvent};

#[derive(Debug)]
pub(crate) enum PersistCommand {
    Dirty { compact: bool },
    /// Write now, whether dirty or not, and report the result.
    Flush(oneshot::Sender<Result<(), GossipStoreError>>),
}

#[derive(Default)]
struct Pending {
    first_change: Option<Instant>,
    last_change: Option<Instant>,
    compact: bool,
}

impl Pending {
    fn mark(&mut self, now: Instant, compact: bool) {
        self.first_change.get_or_insert(now);
        self.last_change = Some(now);
        self.compact |= compact;
    }

    fn deadline(&self, shared: &Shared) -> Option<Instant> {
        let first = self.first_change?;
        let last = self.last_change.unwrap_or(first);
        Some((last + shared.config.persist_debounce).min(first + shared.config.persist_max_delay))
    }

    fn is_dirty(&self) -> bool {
        self.first_change.is_some()
    }

    /// Clear the timer. Compaction stays requested until a write succeeds.
    fn settle(&mut self, written: bool) {
        self.first_change = None;
        self.last_change = None;
        if written {
            self.compact = false;
        }
    }
}

pub(super) async fn run(
    shared: Arc<Shared>,
    mut commands: mpsc::Receiver<PersistCommand>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pending = Pending::default();

    loop {
        let deadline = pending.deadline(&shared);
        let timer = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            command = commands.recv() => match command {
                Some(PersistCommand::Dirty { compact }) => pending.mark(Instant::now(), compact),
                Some(PersistCommand::Flush(reply)) => {
                    let result = write(&shared, pending.compact).await;
                    pending.settle(result.is_ok());
                    let _ = reply.send(result);
                }
                None => break,
            },
            _ = timer => {
                let result = write(&shared, pending.compact).await;
                pending.settle(result.is_ok());
            }
            _ = shutdown.changed() => break,
        }
    }

    // Commands queued before the shutdown signal still count.
    let mut waiting = Vec::new();
    while let Ok(command) = commands.try_recv() {
        match command {
            PersistCommand::Dirty { compact } => pending.mark(Instant::now(), compact),
            PersistCommand::Flush(reply) => waiting.push(reply),
        }
    }

    if pending.is_dirty() || !waiting.is_empty() {
        let result = write(&shared, pending.compact).await;
        for reply in waiting {
            let _ = reply.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(GossipStoreError::PersistenceWriteFailed {
                    reason: e.to_string(),
                }),
            });
        }
    }
    debug!("persister task stopped");
}

/// Snapshot the store and hand it to the backend on the blocking pool.
pub(crate) async fn write(shared: &Arc<Shared>, compact: bool) -> Result<(), GossipStoreError> {
    let (entries, next_sequence) = {
        let store = shared.store.lock();
        (store.snapshot(), store.next_sequence())
    };
    let records = entries
        .iter()
        .map(PersistedRecord::from_entry)
        .collect::<Result<Vec<_>, _>>();

    let result = match records {
        Ok(records) => {
            let snapshot = PersistedSnapshot {
                next_sequence,
                records,
            };
            save_blocking(shared, snapshot, compact).await
        }
        Err(e) => Err(e),
    };

    match &result {
        Ok(()) => {
            shared.metrics.persist_ok.inc();
            debug!(entries = entries.len(), compact, "store persisted");
        }
        Err(e) => {
            shared.metrics.persist_failed.inc();
            warn!("persistence write failed, will retry on next change: {e}");
            let _ = shared.event_tx.try_send(StoreEvent::PersistFailed {
                reason: e.to_string(),
            });
        }
    }
    result
}

async fn save_blocking(
    shared: &Arc<Shared>,
    snapshot: PersistedSnapshot,
    compact: bool,
) -> Result<(), GossipStoreError> {
    let backend = shared.backend.clone();
    let task = tokio::task::spawn_blocking(move || {
        let mut backend = backend.lock();
        backend.save(&snapshot)?;
        if compact {
            backend.compact()?;
            info!(entries = snapshot.records.len(), "persisted snapshot compacted");
        }
        Ok::<_, GossipStoreError>(())
    });

    match tokio::time::timeout(shared.config.persist_timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(GossipStoreError::PersistenceWriteFailed {
            reason: join.to_string(),
        }),
        Err(_) => Err(GossipStoreError::PersistenceWriteFailed {
            reason: format!("timed out after {:?}", shared.config.persist_timeout),
        }),
    }
}
