//! Shared helpers for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;
use gossip_store::{
    AccountAgeWitness, Direction, OfferSummary, OwnerKey, Payload, PeerId, TradeStatistics,
    Transport,
};
use parking_lot::Mutex;

pub const DAY_MS: u64 = 24 * 60 * 60 * 1000;
pub const T0: u64 = 1_700_000_000_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// The offer behind the reference BTC/USD trade.
pub fn btc_usd_offer() -> OfferSummary {
    OfferSummary {
        id: "abc".into(),
        direction: Direction::Buy,
        base_currency: "BTC".into(),
        counter_currency: "USD".into(),
        payment_method_id: "SEPA".into(),
        date: T0 - DAY_MS,
        use_market_based_price: true,
        market_price_margin: 0.01,
        amount: 100_000,
        min_amount: 100_000,
    }
}

/// BTC/USD, price 1000000, amount 100000, offer "abc", tx "tx1".
pub fn btc_usd_trade(owner: u8, trade_date: u64) -> Payload {
    TradeStatistics::from_offer(
        &btc_usd_offer(),
        1_000_000,
        100_000,
        trade_date,
        "tx1",
        OwnerKey::from_bytes([owner; 32]),
    )
    .into()
}

pub fn witness(seed: u8, date: u64) -> Payload {
    AccountAgeWitness::new(vec![seed; 20], date, OwnerKey::from_bytes([seed; 32])).into()
}

/// Transport that records every send.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<(PeerId, Bytes)>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(PeerId, Bytes)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, peer: &PeerId) -> Vec<Bytes> {
        self.sent
            .lock()
            .iter()
            .filter(|(p, _)| p == peer)
            .map(|(_, b)| b.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for RecordingTransport {
    async fn send_to_peer(&self, peer: &PeerId, data: Bytes) -> Result<(), String> {
        self.sent.lock().push((peer.clone(), data));
        Ok(())
    }
}
