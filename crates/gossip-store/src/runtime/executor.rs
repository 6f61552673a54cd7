//! Effect executor: turns StoreEffects into channel sends.
//!
//! - Broadcast -> fan-out queue
//! - Persist   -> persister queue
//! - Lazy      -> lazy-consumer broadcast channel
//! - Emit      -> event channel

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::effect::StoreEffect;
use super::fanout::FanoutJob;
use super::persister::PersistCommand;
use super::Shared;

/// Execute effects without blocking. Safe to call from any context.
pub(super) fn execute_effects(shared: &Shared, effects: Vec<StoreEffect>) {
    for effect in effects {
        match effect {
            StoreEffect::Broadcast { entry, origin } => {
                let hash = entry.hash;
                match shared.fanout_tx.try_send(FanoutJob::Broadcast { entry, origin }) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        shared.metrics.dropped.inc();
                        warn!(%hash, "fan-out queue full, broadcast dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!(%hash, "fan-out stopped, broadcast dropped");
                    }
                }
            }
            StoreEffect::Persist { compact } => {
                // Full means a write is already pending; it will pick this change up.
                // Every save rewrites the full snapshot, so a dropped compaction
                // request only delays space reclamation until the next one.
                let _ = shared.persist_tx.try_send(PersistCommand::Dirty { compact });
            }
            StoreEffect::Lazy(payload) => {
                // Err only when nobody is subscribed.
                let _ = shared.lazy_tx.send(payload);
            }
            StoreEffect::Emit(event) => {
                if let Err(TrySendError::Full(_)) = shared.event_tx.try_send(event) {
                    shared.metrics.dropped.inc();
                    debug!("event channel full, event dropped");
                }
            }
        }
    }
}
