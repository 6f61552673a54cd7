/// Trade statistics: one completed trade, published by both counterparties.
///
/// The taker usually publishes before the maker, and each side stamps
/// `trade_date` with its own clock and signs with its own key. Both copies
/// describe the same trade, so `owner_key` and `trade_date` stay out of the
/// canonical projection.
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{PayloadKind, Projection, StoragePayload};
use crate::capability::{CapabilityId, TRADE_STATISTICS};
use crate::types::OwnerKey;

/// Trade statistics are kept for 30 days after receipt.
pub const TRADE_STATISTICS_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const REQUIRED_CAPABILITIES: &[CapabilityId] = &[TRADE_STATISTICS];

/// Offer direction, from the maker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    fn ordinal(self) -> u8 {
        match self {
            Direction::Buy => 0,
            Direction::Sell => 1,
        }
    }
}

/// The offer fields a trade-statistics record copies.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferSummary {
    pub id: String,
    pub direction: Direction,
    pub base_currency: String,
    pub counter_currency: String,
    pub payment_method_id: String,
    pub date: u64,
    pub use_market_based_price: bool,
    pub market_price_margin: f64,
    pub amount: u64,
    pub min_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeStatistics {
    pub base_currency: String,
    pub counter_currency: String,
    pub direction: Direction,
    /// Price in the smallest unit of the counter currency.
    pub trade_price: u64,
    /// Amount in the smallest unit of the base currency.
    pub trade_amount: u64,
    /// Unix ms, set locally by the publishing party.
    pub trade_date: u64,
    pub payment_method_id: String,
    pub offer_date: u64,
    pub use_market_based_price: bool,
    pub market_price_margin: f64,
    pub offer_amount: u64,
    pub offer_min_amount: u64,
    pub offer_id: String,
    pub deposit_tx_id: String,
    pub owner_key: OwnerKey,
}

impl TradeStatistics {
    /// Build from the offer that produced the trade plus the trade outcome.
    pub fn from_offer(
        offer: &OfferSummary,
        trade_price: u64,
        trade_amount: u64,
        trade_date: u64,
        deposit_tx_id: impl Into<String>,
        owner_key: OwnerKey,
    ) -> Self {
        Self {
            base_currency: offer.base_currency.clone(),
            counter_currency: offer.counter_currency.clone(),
            direction: offer.direction,
            trade_price,
            trade_amount,
            trade_date,
            payment_method_id: offer.payment_method_id.clone(),
            offer_date: offer.date,
            use_market_based_price: offer.use_market_based_price,
            market_price_margin: offer.market_price_margin,
            offer_amount: offer.amount,
            offer_min_amount: offer.min_amount,
            offer_id: offer.id.clone(),
            deposit_tx_id: deposit_tx_id.into(),
            owner_key,
        }
    }

    /// `"BASE/COUNTER"`.
    pub fn market(&self) -> String {
        format!("{}/{}", self.base_currency, self.counter_currency)
    }

    pub fn trade_date(&self) -> u64 {
        self.trade_date
    }

    pub fn offer_id(&self) -> &str {
        &self.offer_id
    }
}

impl StoragePayload for TradeStatistics {
    const KIND: PayloadKind = PayloadKind::TradeStatistics;
    const VERSION: u16 = 1;

    fn ttl(&self) -> Duration {
        TRADE_STATISTICS_TTL
    }

    fn owner_key(&self) -> &OwnerKey {
        &self.owner_key
    }

    fn required_capabilities(&self) -> &'static [CapabilityId] {
        REQUIRED_CAPABILITIES
    }

    fn declared_at(&self) -> Option<u64> {
        Some(self.trade_date)
    }

    fn lazily_processed(&self) -> bool {
        true
    }

    // owner_key: excluded, each counterparty signs its own copy.
    // trade_date: excluded, stamped locally by each counterparty.
    fn project(&self, out: &mut Projection) {
        out.str(&self.base_currency)
            .str(&self.counter_currency)
            .u8(self.direction.ordinal())
            .u64(self.trade_price)
            .u64(self.trade_amount)
            .str(&self.payment_method_id)
            .u64(self.offer_date)
            .bool(self.use_market_based_price)
            .f64(self.market_price_margin)
            .u64(self.offer_amount)
            .u64(self.offer_min_amount)
            .str(&self.offer_id)
            .str(&self.deposit_tx_id);
    }
}

impl fmt::Display for TradeStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TradeStatistics{{market={}, direction={:?}, trade_price={}, trade_amount={}, \
             trade_date={}, payment_method={}, offer_date={}, use_market_based_price={}, \
             market_price_margin={}, offer_amount={}, offer_min_amount={}, offer_id={}, \
             deposit_tx_id={}, owner_key={}}}",
            self.market(),
            self.direction,
            self.trade_price,
            self.trade_amount,
            self.trade_date,
            self.payment_method_id,
            self.offer_date,
            self.use_market_based_price,
            self.market_price_margin,
            self.offer_amount,
            self.offer_min_amount,
            self.offer_id,
            self.deposit_tx_id,
            self.owner_key,
        )
    }
}
