//! Order-book depth imbalance with a price-impact confirmation.
//!
//! A lopsided book alone is not enough: a thin two-sided book can show a
//! large ratio on tiny size. The dominant side's notional is walked through
//! the opposing book, and the signal only fires if that walk moves price by
//! at least the configured impact.

use rust_decimal::Decimal;

use super::signal::{SignalDetails, SignalKind, Strength};
use super::{Detection, DetectionContext, Detector};
use crate::normalizer::{EventPayload, NormalizedEvent};
use crate::orderbook::{price_impact, Side};

/// Imbalance thresholds.
#[derive(Debug, Clone)]
pub struct ImbalanceConfig {
    /// Minimum dominant / other depth ratio.
    pub min_ratio: Decimal,
    /// Minimum USD depth of the dominant side.
    pub min_depth: Decimal,
    /// Minimum walked price impact on the opposing side.
    pub min_price_impact: Decimal,
    /// Levels summed per side.
    pub levels: usize,
    /// Minimum time between signals for one token.
    pub cooldown_ms: i64,
}

impl Default for ImbalanceConfig {
    fn default() -> Self {
        Self {
            min_ratio: Decimal::new(10, 0),
            min_depth: Decimal::new(1_000, 0),
            min_price_impact: Decimal::new(1, 2),
            levels: 3,
            cooldown_ms: 300_000,
        }
    }
}

/// Detects books whose top levels lean heavily to one side.
#[derive(Debug)]
pub struct ImbalanceDetector {
    config: ImbalanceConfig,
}

impl ImbalanceDetector {
    /// Create a detector.
    pub fn new(config: ImbalanceConfig) -> Self {
        Self { config }
    }
}

impl Detector for ImbalanceDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::Imbalance
    }

    fn cooldown_ms(&self) -> i64 {
        self.config.cooldown_ms
    }

    fn process(&mut self, event: &NormalizedEvent, ctx: &DetectionContext<'_>) -> Option<Detection> {
        let EventPayload::Book(book) = &event.payload else {
            return None;
        };

        let bid_depth = book.depth_usd(Side::Bid, self.config.levels);
        let ask_depth = book.depth_usd(Side::Ask, self.config.levels);
        if bid_depth.is_zero() || ask_depth.is_zero() {
            return None;
        }

        let (direction, dominant, other) = if bid_depth >= ask_depth {
            (Side::Bid, bid_depth, ask_depth)
        } else {
            (Side::Ask, ask_depth, bid_depth)
        };
        let ratio = dominant / other;
        if ratio < self.config.min_ratio || dominant < self.config.min_depth {
            return None;
        }

        // Bid pressure consumes asks; ask pressure consumes bids.
        let walk = price_impact(book, direction.opposite(), dominant)?;
        let impact = walk.price_impact();
        if impact < self.config.min_price_impact {
            return None;
        }

        let token_id = event.token_id.clone();
        let mut meta = event.meta.clone();
        meta.merge_missing(&ctx.store.market_meta(&event.market_id));
        Some(Detection {
            key: token_id.clone().unwrap_or_else(|| event.market_id.clone()),
            venue: event.venue,
            market_id: event.market_id.clone(),
            token_id,
            meta,
            strength: Strength::from_ratio(ratio, self.config.min_ratio),
            details: SignalDetails::Imbalance {
                direction,
                bid_depth,
                ask_depth,
                ratio,
                price_impact: impact,
                book_exhausted: walk.exhausted,
            },
        })
    }
}
