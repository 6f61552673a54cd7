/// Fan-out task: sends accepted payloads to capable peers.
///
/// Each broadcast reads a point-in-time snapshot of the peer table, filters
/// it through the capability check, and sends concurrently. A failed send
/// skips that peer for this broadcast only.
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

use crate::capability::can_receive;
use crate::store::StoreEntry;
use crate::types::PeerId;
use crate::wire;

use super::transport::Transport;
use super::{Shared, StoreEvent};

#[derive(Debug)]
pub(crate) enum FanoutJob {
    Broadcast {
        entry: StoreEntry,
        origin: Option<PeerId>,
    },
    /// Answered once every job queued before it has been sent.
    Barrier(oneshot::Sender<()>),
}

pub(super) async fn run(
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    mut jobs: mpsc::Receiver<FanoutJob>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            job = jobs.recv() => match job {
                Some(FanoutJob::Broadcast { entry, origin }) => {
                    broadcast(&shared, &transport, &entry, origin.as_ref()).await;
                }
                Some(FanoutJob::Barrier(done)) => {
                    let _ = done.send(());
                }
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("fan-out task stopped");
}

/// Peers that should receive `entry`: known, capable, and not its origin.
pub(crate) fn targets(shared: &Shared, entry: &StoreEntry, origin: Option<&PeerId>) -> Vec<PeerId> {
    shared
        .peers
        .read()
        .snapshot()
        .into_iter()
        .filter(|(peer, _)| Some(peer) != origin)
        .filter(|(_, caps)| can_receive(&entry.payload, caps))
        .map(|(peer, _)| peer)
        .collect()
}

async fn broadcast(
    shared: &Arc<Shared>,
    transport: &Arc<dyn Transport>,
    entry: &StoreEntry,
    origin: Option<&PeerId>,
) {
    let peers = targets(shared, entry, origin);
    if peers.is_empty() {
        return;
    }
    let data = match wire::encode(&entry.payload) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            warn!(hash = %entry.hash, "cannot encode payload for broadcast: {e}");
            return;
        }
    };
    trace!(hash = %entry.hash, peers = peers.len(), "broadcasting");

    let limit = shared.config.fanout_concurrency;
    let mut sends = JoinSet::new();
    for peer in peers {
        if sends.len() >= limit {
            if let Some(result) = sends.join_next().await {
                record(shared, result);
            }
        }
        let transport = transport.clone();
        let data = data.clone();
        sends.spawn(async move {
            let result = transport.send_to_peer(&peer, data).await;
            (peer, result)
        });
    }
    while let Some(result) = sends.join_next().await {
        record(shared, result);
    }
}

fn record(
    shared: &Shared,
    result: Result<(PeerId, Result<(), String>), tokio::task::JoinError>,
) {
    match result {
        Ok((_, Ok(()))) => shared.metrics.sends_ok.inc(),
        Ok((peer, Err(reason))) => {
            shared.metrics.sends_failed.inc();
            debug!(%peer, "send failed, skipping peer: {reason}");
            let _ = shared
                .event_tx
                .try_send(StoreEvent::SendFailed { peer, reason });
        }
        Err(e) => {
            shared.metrics.sends_failed.inc();
            warn!("send task failed: {e}");
        }
    }
}
