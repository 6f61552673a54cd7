/// Trade statistics aggregator: a lazy consumer of the store.
///
/// Keeps per-market totals from accepted trade-statistics payloads. It runs
/// as its own task on the store's lazy channel and never holds the store
/// lock; a consumer that falls behind loses notifications (counted) instead
/// of slowing ingestion.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::payload::{Payload, TradeStatistics};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketStats {
    pub trades: u64,
    pub total_amount: u128,
    /// Price of the trade with the latest trade date.
    pub last_price: u64,
    pub last_trade_date: u64,
}

#[derive(Clone, Default)]
pub struct TradeStatsAggregator {
    markets: Arc<RwLock<BTreeMap<String, MarketStats>>>,
    lagged: Arc<AtomicU64>,
}

impl TradeStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, stats: &TradeStatistics) {
        let mut markets = self.markets.write();
        let market = markets.entry(stats.market()).or_default();
        market.trades += 1;
        market.total_amount += u128::from(stats.trade_amount);
        if stats.trade_date >= market.last_trade_date {
            market.last_trade_date = stats.trade_date;
            market.last_price = stats.trade_price;
        }
    }

    /// Catch up on payloads accepted before the consumer subscribed.
    pub fn seed<I>(&self, payloads: I)
    where
        I: IntoIterator<Item = Arc<Payload>>,
    {
        for payload in payloads {
            if let Some(stats) = payload.as_trade_statistics() {
                self.record(stats);
            }
        }
    }

    pub fn market(&self, market: &str) -> Option<MarketStats> {
        self.markets.read().get(market).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, MarketStats> {
        self.markets.read().clone()
    }

    /// Notifications lost because the consumer lagged.
    pub fn lagged(&self) -> u64 {
        self.lagged.load(Ordering::Relaxed)
    }

    /// Consume the lazy channel until the store shuts down.
    pub fn spawn(&self, mut lazy: broadcast::Receiver<Arc<Payload>>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match lazy.recv().await {
                    Ok(payload) => {
                        if let Some(stats) = payload.as_trade_statistics() {
                            this.record(stats);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        this.lagged.fetch_add(missed, Ordering::Relaxed);
                        warn!(missed, "trade statistics consumer lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("trade statistics consumer stopped");
        })
    }
}
