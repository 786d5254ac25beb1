//! Collapse of resting depth against a lookback baseline.

use rust_decimal::Decimal;

use super::signal::{Signal, SignalDetails, SignalKind, Strength};
use super::window::SeriesMap;
use super::{Detection, DetectionContext, Detector};
use crate::normalizer::{EventPayload, NormalizedEvent};
use crate::orderbook::Side;

/// Series tracked at once.
const MAX_SERIES: usize = 20_000;

/// Liquidity thresholds.
#[derive(Debug, Clone)]
pub struct LiquidityConfig {
    /// Minimum relative drop of total depth.
    pub min_drop: Decimal,
    /// Minimum baseline depth in USD.
    pub min_depth: Decimal,
    /// Distance of the baseline sample.
    pub lookback_ms: i64,
    /// Levels summed per side.
    pub levels: usize,
    /// Minimum time between signals for one token.
    pub cooldown_ms: i64,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            min_drop: Decimal::new(5, 1),
            min_depth: Decimal::new(1_000, 0),
            lookback_ms: 60_000,
            levels: 5,
            cooldown_ms: 300_000,
        }
    }
}

/// Detects books whose depth fell sharply within the lookback.
#[derive(Debug)]
pub struct LiquidityDetector {
    config: LiquidityConfig,
    depth: SeriesMap,
}

impl LiquidityDetector {
    /// Create a detector.
    pub fn new(config: LiquidityConfig) -> Self {
        Self {
            depth: SeriesMap::new(config.lookback_ms, MAX_SERIES),
            config,
        }
    }
}

impl Detector for LiquidityDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::Liquidity
    }

    fn cooldown_ms(&self) -> i64 {
        self.config.cooldown_ms
    }

    fn process(&mut self, event: &NormalizedEvent, ctx: &DetectionContext<'_>) -> Option<Detection> {
        let EventPayload::Book(book) = &event.payload else {
            return None;
        };
        let key = event
            .token_id
            .clone()
            .unwrap_or_else(|| event.market_id.clone());
        let ts = event.timestamp_ms;
        let current = book.depth_usd(Side::Bid, self.config.levels)
            + book.depth_usd(Side::Ask, self.config.levels);

        let series = self.depth.push(&key, ts, current)?;
        let (baseline_ts, baseline) = series.baseline(ts, self.config.lookback_ms)?;
        if baseline < self.config.min_depth {
            return None;
        }
        let drop = (baseline - current) / baseline;
        if drop < self.config.min_drop {
            return None;
        }

        let mut meta = event.meta.clone();
        meta.merge_missing(&ctx.store.market_meta(&event.market_id));
        Some(Detection {
            key,
            venue: event.venue,
            market_id: event.market_id.clone(),
            token_id: event.token_id.clone(),
            meta,
            strength: Strength::from_ratio(drop, self.config.min_drop),
            details: SignalDetails::Liquidity {
                previous_depth: baseline,
                current_depth: current,
                drop,
                elapsed_ms: ts - baseline_ts,
            },
        })
    }

    fn committed(&mut self, signal: &Signal) {
        let key = signal.token_id.as_deref().unwrap_or(&signal.market_id);
        self.depth.reset_to_latest(key);
    }
}
