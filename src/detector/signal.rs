//! Signal types emitted by the detector pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::market::{MarketListing, MarketMeta, Outcome, Venue};
use crate::orderbook::Side;

/// Detector that produced a signal.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SignalKind {
    /// Cross-outcome arbitrage on cached prices.
    Arbitrage,
    /// Order-book depth imbalance.
    Imbalance,
    /// Price spike within a sliding window.
    PriceSpike,
    /// Single large trade.
    LargeTrade,
    /// Newly listed market.
    NewMarket,
    /// Tracked trader position change.
    SmartMoney,
    /// Implied arbitrage through mirror books.
    DeepArbitrage,
    /// Collapse of resting depth.
    Liquidity,
    /// Shift of the bid/ask depth balance.
    Skew,
    /// Ranked batch of markets about to close.
    ClosingSoon,
}

impl SignalKind {
    /// Static label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Coarse urgency of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Strength {
    /// Just over the threshold.
    Low,
    /// Comfortably over the threshold.
    Medium,
    /// Far over the threshold.
    High,
}

impl Strength {
    /// Grade a metric against its threshold: 3x is high, 1.5x is medium.
    pub fn from_ratio(value: Decimal, threshold: Decimal) -> Self {
        if threshold <= Decimal::ZERO {
            return Strength::Medium;
        }
        let ratio = value.abs() / threshold;
        if ratio >= Decimal::from(3) {
            Strength::High
        } else if ratio >= Decimal::new(15, 1) {
            Strength::Medium
        } else {
            Strength::Low
        }
    }
}

/// Which way a two-leg arbitrage trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArbDirection {
    /// Buy both legs for less than the $1 payout.
    BuyBoth,
    /// Sell both legs for more than the $1 payout.
    SellBoth,
}

/// Classified change of a tracked trader's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PositionAction {
    /// New position.
    Open,
    /// Size increased past the change threshold.
    Add,
    /// Size decreased past the change threshold.
    Reduce,
    /// Position gone.
    Close,
}

/// One market in a closing-soon batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosingSoonEntry {
    /// Market identifier.
    pub market_id: String,
    /// Descriptive metadata.
    pub meta: MarketMeta,
    /// Unix milliseconds when trading ends.
    pub end_time_ms: i64,
    /// Milliseconds left at scan time.
    pub time_remaining_ms: i64,
    /// Trailing 24h volume.
    pub volume_24h: Decimal,
    /// Resting liquidity.
    pub liquidity: Decimal,
    /// Last YES price, when known.
    pub price: Option<Decimal>,
    /// Composite ranking score in `[0, 1]`.
    pub score: f64,
}

/// Detector-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalDetails {
    /// Cross-outcome arbitrage.
    Arbitrage {
        /// YES token id.
        yes_token_id: String,
        /// NO token id.
        no_token_id: String,
        /// YES leg price.
        yes_price: Decimal,
        /// NO leg price.
        no_price: Decimal,
        /// YES leg depth in USD.
        yes_depth: Decimal,
        /// NO leg depth in USD.
        no_depth: Decimal,
        /// Profit breakdown.
        quote: ArbitrageQuote,
    },
    /// Order-book imbalance.
    Imbalance {
        /// Dominant side.
        direction: Side,
        /// Bid depth over the top levels.
        bid_depth: Decimal,
        /// Ask depth over the top levels.
        ask_depth: Decimal,
        /// Dominant / other depth.
        ratio: Decimal,
        /// Walked price impact on the opposing side.
        price_impact: Decimal,
        /// Whether the opposing side ran out during the walk.
        book_exhausted: bool,
    },
    /// Price spike.
    PriceSpike {
        /// Oldest price in the window.
        from_price: Decimal,
        /// Latest price.
        to_price: Decimal,
        /// Signed relative change.
        change: Decimal,
        /// Milliseconds between the two prices.
        elapsed_ms: i64,
    },
    /// Large trade.
    LargeTrade {
        /// Execution price.
        price: Decimal,
        /// Executed shares.
        size: Decimal,
        /// `price * size`.
        value: Decimal,
        /// Aggressor side.
        side: Option<Side>,
        /// Outcome leg traded.
        outcome: Outcome,
        /// Trader address, when exposed.
        trader: Option<String>,
    },
    /// Newly listed market.
    NewMarket {
        /// Listing row.
        listing: MarketListing,
    },
    /// Tracked trader position change.
    SmartMoney {
        /// Trader address.
        address: String,
        /// Leaderboard rank.
        rank: u32,
        /// Display name.
        trader_name: Option<String>,
        /// Classified change.
        action: PositionAction,
        /// Outcome held.
        outcome: Outcome,
        /// Shares before.
        previous_size: Decimal,
        /// Shares now.
        current_size: Decimal,
        /// Relative size change.
        change: Decimal,
        /// USD value used for the gate.
        value: Decimal,
    },
    /// Implied arbitrage through mirror books.
    DeepArbitrage {
        /// Buy or sell both legs.
        direction: ArbDirection,
        /// YES token id.
        yes_token_id: String,
        /// NO token id.
        no_token_id: String,
        /// Effective YES price.
        effective_yes: Decimal,
        /// Effective NO price.
        effective_no: Decimal,
        /// Whether the YES leg is priced through the NO book.
        yes_via_mirror: bool,
        /// Whether the NO leg is priced through the YES book.
        no_via_mirror: bool,
        /// Sum of direct quotes, when both exist.
        naive_total: Option<Decimal>,
        /// Smaller of the two leg depths in USD.
        depth: Decimal,
        /// Profit breakdown on effective prices.
        quote: ArbitrageQuote,
    },
    /// Depth collapse.
    Liquidity {
        /// Depth at the lookback point.
        previous_depth: Decimal,
        /// Depth now.
        current_depth: Decimal,
        /// Relative drop.
        drop: Decimal,
        /// Milliseconds between the two samples.
        elapsed_ms: i64,
    },
    /// Bid/ask balance shift.
    Skew {
        /// Bid share at the lookback point.
        previous_bid_share: Decimal,
        /// Bid share now.
        current_bid_share: Decimal,
        /// `current - previous`.
        shift: Decimal,
        /// Side gaining depth.
        direction: Side,
    },
    /// Ranked closing-soon batch.
    ClosingSoon {
        /// Ranked markets, best first.
        markets: Vec<ClosingSoonEntry>,
        /// Sorted id list of `markets`.
        digest: String,
    },
}

/// Profit breakdown of a two-leg position paying $1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrageQuote {
    /// `yes + no`.
    pub sum: Decimal,
    /// Distance of `sum` from the $1 payout in the trade's favor.
    pub gross_profit: Decimal,
    /// `sum * fee * 2`.
    pub total_fee: Decimal,
    /// `sum * slippage * 2`.
    pub total_slippage: Decimal,
    /// Gross minus costs.
    pub net_profit: Decimal,
    /// `net_profit / sum * 100`.
    pub net_profit_percent: Decimal,
}

/// One emitted signal. Immutable; ownership passes to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Process-unique, increasing id.
    pub id: u64,
    /// Emitting detector.
    pub kind: SignalKind,
    /// Venue of the market.
    pub venue: Venue,
    /// Market identifier.
    pub market_id: String,
    /// Token identifier, for token-level detections.
    pub token_id: Option<String>,
    /// Descriptive metadata.
    pub meta: MarketMeta,
    /// Urgency grade.
    pub strength: Strength,
    /// Unix milliseconds of emission.
    pub timestamp_ms: i64,
    /// Rate-governor key; signals sharing it describe the same situation.
    pub correlation_id: String,
    /// Detector-specific metrics.
    pub details: SignalDetails,
}

impl Signal {
    /// Headline metric compared against subscriber thresholds.
    pub fn magnitude(&self) -> Decimal {
        match &self.details {
            SignalDetails::Arbitrage { quote, .. } | SignalDetails::DeepArbitrage { quote, .. } => {
                quote.net_profit_percent
            }
            SignalDetails::Imbalance { ratio, .. } => *ratio,
            SignalDetails::PriceSpike { change, .. } => change.abs() * Decimal::ONE_HUNDRED,
            SignalDetails::LargeTrade { value, .. } => *value,
            SignalDetails::NewMarket { listing } => listing.volume_24h,
            SignalDetails::SmartMoney { value, .. } => *value,
            SignalDetails::Liquidity { drop, .. } => *drop * Decimal::ONE_HUNDRED,
            SignalDetails::Skew { shift, .. } => shift.abs() * Decimal::ONE_HUNDRED,
            SignalDetails::ClosingSoon { markets, .. } => Decimal::from(markets.len()),
        }
    }

    /// Best human readable label for the market.
    pub fn label(&self) -> &str {
        self.meta
            .title
            .as_deref()
            .or(self.meta.slug.as_deref())
            .unwrap_or(&self.market_id)
    }
}
