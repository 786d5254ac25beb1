//! Detector pipeline: ten independent pattern detectors behind one contract.
//!
//! Each detector applies its own data-completeness and threshold gates and
//! returns [`Detection`]s. The [`DetectorPipeline`] then applies the shared
//! Rate Governor gates (cooldown, then hourly quota), stamps the signal,
//! records it in the detector's alert history and reports it back through
//! [`Detector::committed`].
//!
//! # Detectors
//!
//! - [`ArbitrageDetector`]: cached YES + NO below $1 after fees and slippage
//! - [`ImbalanceDetector`]: lopsided depth whose walk also moves price
//! - [`SpikeDetector`]: relative move within a sliding window
//! - [`LargeTradeDetector`]: single trade notional over a floor
//! - [`NewMarketDetector`]: listing ids not seen before (after a baseline)
//! - [`SmartMoneyDetector`]: position diffs of ranked traders
//! - [`DeepArbitrageDetector`]: arbitrage through mirror-book pricing
//! - [`LiquidityDetector`]: depth drop against a minute-old baseline
//! - [`SkewDetector`]: bid/ask balance shift against a minute-old baseline
//! - [`ClosingSoonDetector`]: ranked batch of markets about to close

pub mod arbitrage;
pub mod closing_soon;
pub mod deep_arbitrage;
pub mod history;
pub mod imbalance;
pub mod large_trade;
pub mod liquidity;
pub mod new_market;
pub mod pipeline;
pub mod signal;
pub mod skew;
pub mod smart_money;
pub mod spike;
pub mod window;

use std::collections::HashSet;

use crate::market::{ListingScan, MarketMeta, PositionSnapshot, RankedTrader, Venue};
use crate::normalizer::NormalizedEvent;
use crate::store::MarketStateStore;

pub use arbitrage::{compute_quote, ArbitrageConfig, ArbitrageDetector};
pub use closing_soon::{ClosingSoonConfig, ClosingSoonDetector};
pub use deep_arbitrage::{DeepArbitrageConfig, DeepArbitrageDetector};
pub use history::AlertHistory;
pub use imbalance::{ImbalanceConfig, ImbalanceDetector};
pub use large_trade::{LargeTradeConfig, LargeTradeDetector};
pub use liquidity::{LiquidityConfig, LiquidityDetector};
pub use new_market::{NewMarketConfig, NewMarketDetector};
pub use pipeline::{DetectorPipeline, DetectorStats};
pub use signal::{
    ArbDirection, ArbitrageQuote, ClosingSoonEntry, PositionAction, Signal, SignalDetails,
    SignalKind, Strength,
};
pub use skew::{SkewConfig, SkewDetector};
pub use smart_money::{SmartMoneyConfig, SmartMoneyDetector};
pub use spike::{SpikeConfig, SpikeDetector};
pub use window::{RollingSeries, SeriesMap};

/// Read-only view handed to detectors for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    /// Market State Store after the triggering event was applied.
    pub store: &'a MarketStateStore,
    /// Evaluation time, Unix milliseconds.
    pub now_ms: i64,
}

/// Batch input for poll-driven detectors.
#[derive(Debug, Clone, Copy)]
pub enum ScanInput<'a> {
    /// One venue listing refresh.
    Listings(&'a ListingScan),
    /// A listing scan taken for closing-soon ranking.
    ClosingWindow(&'a ListingScan),
    /// The tracked trader set changed.
    Leaderboard(&'a [RankedTrader]),
    /// Current positions of one tracked trader.
    Positions(&'a PositionSnapshot),
}

/// A pattern match that passed the detector's own gates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Cooldown key within the detector (market, token, address:market...).
    pub key: String,
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
    /// Detector-specific metrics.
    pub details: SignalDetails,
}

/// Common contract of every detector.
///
/// Implementations must not block: network work happens in background scan
/// tasks whose results arrive through [`Detector::scan`].
pub trait Detector: Send {
    /// Which detector this is.
    fn kind(&self) -> SignalKind;

    /// Minimum time between two signals for the same key.
    fn cooldown_ms(&self) -> i64;

    /// Stream mode: evaluate one event.
    fn process(&mut self, event: &NormalizedEvent, ctx: &DetectionContext<'_>)
        -> Option<Detection>;

    /// Batch mode: evaluate one scan result.
    fn scan(&mut self, _input: ScanInput<'_>, _ctx: &DetectionContext<'_>) -> Vec<Detection> {
        Vec::new()
    }

    /// Called once a detection passed the governor and became a signal.
    fn committed(&mut self, _signal: &Signal) {}
}

/// Thresholds for every detector.
#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Detectors left out of the pipeline.
    pub disabled: HashSet<SignalKind>,
    /// Signals retained per detector.
    pub history_size: usize,
    /// Arbitrage thresholds.
    pub arbitrage: ArbitrageConfig,
    /// Implied arbitrage thresholds.
    pub deep_arbitrage: DeepArbitrageConfig,
    /// Imbalance thresholds.
    pub imbalance: ImbalanceConfig,
    /// Spike thresholds.
    pub spike: SpikeConfig,
    /// Large trade thresholds.
    pub large_trade: LargeTradeConfig,
    /// New market parameters.
    pub new_market: NewMarketConfig,
    /// Smart money thresholds.
    pub smart_money: SmartMoneyConfig,
    /// Liquidity thresholds.
    pub liquidity: LiquidityConfig,
    /// Skew thresholds.
    pub skew: SkewConfig,
    /// Closing-soon parameters.
    pub closing_soon: ClosingSoonConfig,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            disabled: HashSet::new(),
            history_size: 100,
            arbitrage: ArbitrageConfig::default(),
            deep_arbitrage: DeepArbitrageConfig::default(),
            imbalance: ImbalanceConfig::default(),
            spike: SpikeConfig::default(),
            large_trade: LargeTradeConfig::default(),
            new_market: NewMarketConfig::default(),
            smart_money: SmartMoneyConfig::default(),
            liquidity: LiquidityConfig::default(),
            skew: SkewConfig::default(),
            closing_soon: ClosingSoonConfig::default(),
        }
    }
}

impl DetectorSettings {
    /// Instantiate every enabled detector.
    pub fn build(&self) -> Vec<Box<dyn Detector>> {
        let all: Vec<Box<dyn Detector>> = vec![
            Box::new(ArbitrageDetector::new(self.arbitrage.clone())),
            Box::new(ImbalanceDetector::new(self.imbalance.clone())),
            Box::new(SpikeDetector::new(self.spike.clone())),
            Box::new(LargeTradeDetector::new(self.large_trade.clone())),
            Box::new(NewMarketDetector::new(self.new_market.clone())),
            Box::new(SmartMoneyDetector::new(self.smart_money.clone())),
            Box::new(DeepArbitrageDetector::new(self.deep_arbitrage.clone())),
            Box::new(LiquidityDetector::new(self.liquidity.clone())),
            Box::new(SkewDetector::new(self.skew.clone())),
            Box::new(ClosingSoonDetector::new(self.closing_soon.clone())),
        ];
        all.into_iter()
            .filter(|d| !self.disabled.contains(&d.kind()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_skips_disabled_detectors() {
        let mut settings = DetectorSettings::default();
        assert_eq!(settings.build().len(), 10);

        settings.disabled.insert(SignalKind::Skew);
        settings.disabled.insert(SignalKind::ClosingSoon);
        let kinds: Vec<SignalKind> = settings.build().iter().map(|d| d.kind()).collect();
        assert_eq!(kinds.len(), 8);
        assert!(!kinds.contains(&SignalKind::Skew));
    }
}
