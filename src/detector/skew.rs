//! Shift of the bid/ask depth balance against a lookback baseline.
//!
//! The balance is the bid share of the top levels' depth, in `[0, 1]`. A
//! shift toward 1 means bids are building relative to asks.

use rust_decimal::Decimal;

use super::signal::{SignalDetails, SignalKind, Strength};
use super::window::SeriesMap;
use super::{Detection, DetectionContext, Detector};
use crate::normalizer::{EventPayload, NormalizedEvent};
use crate::orderbook::{bid_share, Side};

/// Series tracked at once.
const MAX_SERIES: usize = 20_000;

/// Skew thresholds.
#[derive(Debug, Clone)]
pub struct SkewConfig {
    /// Minimum absolute change of the bid share.
    pub min_shift: Decimal,
    /// Minimum current total depth in USD.
    pub min_depth: Decimal,
    /// Distance of the baseline sample.
    pub lookback_ms: i64,
    /// Levels summed per side.
    pub levels: usize,
    /// Minimum time between signals for one token.
    pub cooldown_ms: i64,
}

impl Default for SkewConfig {
    fn default() -> Self {
        Self {
            min_shift: Decimal::new(25, 2),
            min_depth: Decimal::new(500, 0),
            lookback_ms: 60_000,
            levels: 5,
            cooldown_ms: 300_000,
        }
    }
}

/// Detects books whose balance moved toward one side.
#[derive(Debug)]
pub struct SkewDetector {
    config: SkewConfig,
    shares: SeriesMap,
}

impl SkewDetector {
    /// Create a detector.
    pub fn new(config: SkewConfig) -> Self {
        Self {
            shares: SeriesMap::new(config.lookback_ms, MAX_SERIES),
            config,
        }
    }
}

impl Detector for SkewDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::Skew
    }

    fn cooldown_ms(&self) -> i64 {
        self.config.cooldown_ms
    }

    fn process(&mut self, event: &NormalizedEvent, ctx: &DetectionContext<'_>) -> Option<Detection> {
        let EventPayload::Book(book) = &event.payload else {
            return None;
        };
        let current = bid_share(book, self.config.levels)?;
        let key = event
            .token_id
            .clone()
            .unwrap_or_else(|| event.market_id.clone());
        let ts = event.timestamp_ms;

        let series = self.shares.push(&key, ts, current)?;
        let (_, previous) = series.baseline(ts, self.config.lookback_ms)?;

        let total = book.depth_usd(Side::Bid, self.config.levels)
            + book.depth_usd(Side::Ask, self.config.levels);
        if total < self.config.min_depth {
            return None;
        }
        let shift = current - previous;
        if shift.abs() < self.config.min_shift {
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
            strength: Strength::from_ratio(shift, self.config.min_shift),
            details: SignalDetails::Skew {
                previous_bid_share: previous,
                current_bid_share: current,
                shift,
                direction: if shift > Decimal::ZERO { Side::Bid } else { Side::Ask },
            },
        })
    }
}
