use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::effect::StoreEffect;
use super::executor::execute_effects;
use super::{Shared, StoreEvent};

/// Periodic expiry sweep. The first tick fires one interval after start.
pub(super) async fn run(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let period = shared.config.sweep_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&shared).await;
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("sweeper task stopped");
}

/// Remove every expired entry, one batch per lock acquisition.
///
/// Returns the number of entries removed. Schedules a compaction when
/// anything was removed.
pub(crate) async fn sweep(shared: &Shared) -> usize {
    let batch_size = shared.config.sweep_batch_size;
    let mut removed = 0;

    loop {
        let now = shared.clock.now_ms();
        let batch = shared.store.lock().remove_expired(now, batch_size);
        let full_batch = batch.len() == batch_size;
        removed += batch.len();

        let effects = batch
            .into_iter()
            .map(|entry| {
                StoreEffect::Emit(StoreEvent::Expired {
                    hash: entry.hash,
                    sequence: entry.sequence,
                })
            })
            .collect();
        execute_effects(shared, effects);

        if !full_batch {
            break;
        }
        tokio::task::yield_now().await;
    }

    if removed > 0 {
        shared.metrics.expired.inc_by(removed as u64);
        execute_effects(shared, vec![StoreEffect::Persist { compact: true }]);
        info!(removed, "expired payloads swept");
    }
    removed
}
