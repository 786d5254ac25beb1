//! Price spike over a sliding time window.

use rust_decimal::Decimal;

use super::signal::{Signal, SignalDetails, SignalKind, Strength};
use super::window::SeriesMap;
use super::{Detection, DetectionContext, Detector};
use crate::normalizer::{EventPayload, NormalizedEvent};

/// Series tracked at once.
const MAX_SERIES: usize = 20_000;

/// Spike thresholds.
#[derive(Debug, Clone)]
pub struct SpikeConfig {
    /// Minimum `|latest - oldest| / oldest`.
    pub min_change: Decimal,
    /// Window length.
    pub window_ms: i64,
    /// Minimum 24h volume; zero disables the gate.
    pub min_volume: Decimal,
    /// Minimum time between signals for one token.
    pub cooldown_ms: i64,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            min_change: Decimal::new(10, 2),
            window_ms: 300_000,
            min_volume: Decimal::ZERO,
            cooldown_ms: 300_000,
        }
    }
}

/// Detects fast relative moves of a token's price.
#[derive(Debug)]
pub struct SpikeDetector {
    config: SpikeConfig,
    series: SeriesMap,
}

impl SpikeDetector {
    /// Create a detector.
    pub fn new(config: SpikeConfig) -> Self {
        Self {
            series: SeriesMap::new(config.window_ms, MAX_SERIES),
            config,
        }
    }

    /// Number of tracked series.
    pub fn tracked(&self) -> usize {
        self.series.len()
    }
}

impl Detector for SpikeDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::PriceSpike
    }

    fn cooldown_ms(&self) -> i64 {
        self.config.cooldown_ms
    }

    fn process(&mut self, event: &NormalizedEvent, ctx: &DetectionContext<'_>) -> Option<Detection> {
        let price = match &event.payload {
            EventPayload::Price { price, .. } => *price,
            EventPayload::Book(book) => book.best_ask().or_else(|| book.best_bid())?,
            _ => return None,
        };
        let key = event
            .token_id
            .clone()
            .unwrap_or_else(|| event.market_id.clone());

        let ts = event.timestamp_ms;
        let series = self.series.push(&key, ts, price)?;
        let (from_ts, from_price) = series.oldest_since(ts - self.config.window_ms)?;
        if from_price.is_zero() || from_ts == ts {
            return None;
        }
        let change = (price - from_price) / from_price;
        if change.abs() < self.config.min_change {
            return None;
        }

        if self.config.min_volume > Decimal::ZERO {
            let volume = ctx.store.market(&event.market_id)?.volume_24h;
            if volume < self.config.min_volume {
                return None;
            }
        }

        let mut meta = event.meta.clone();
        meta.merge_missing(&ctx.store.market_meta(&event.market_id));
        Some(Detection {
            key,
            venue: event.venue,
            market_id: event.market_id.clone(),
            token_id: event.token_id.clone(),
            meta,
            strength: Strength::from_ratio(change, self.config.min_change),
            details: SignalDetails::PriceSpike {
                from_price,
                to_price: price,
                change,
                elapsed_ms: ts - from_ts,
            },
        })
    }

    fn committed(&mut self, signal: &Signal) {
        // Measure the next move from the post-spike level.
        let key = signal.token_id.as_deref().unwrap_or(&signal.market_id);
        self.series.reset_to_latest(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketListing, MarketMeta, Outcome, Venue};
    use crate::normalizer::PriceSource;
    use crate::store::{MarketStateStore, StoreConfig};
    use rust_decimal_macros::dec;

    fn tick(price: Decimal, ts: i64) -> NormalizedEvent {
        NormalizedEvent {
            venue: Venue::Polymarket,
            market_id: "M".to_string(),
            token_id: Some("tok".to_string()),
            outcome: Outcome::Yes,
            timestamp_ms: ts,
            meta: MarketMeta::default(),
            payload: EventPayload::Price {
                price,
                source: PriceSource::BestAsk,
            },
        }
    }

    fn detector() -> SpikeDetector {
        SpikeDetector::new(SpikeConfig {
            min_change: dec!(0.10),
            window_ms: 60_000,
            min_volume: Decimal::ZERO,
            cooldown_ms: 0,
        })
    }

    #[test]
    fn fires_on_move_within_window() {
        let store = MarketStateStore::new(StoreConfig::default());
        let ctx = DetectionContext { store: &store, now_ms: 0 };
        let mut detector = detector();

        assert!(detector.process(&tick(dec!(0.40), 0), &ctx).is_none());
        assert!(detector.process(&tick(dec!(0.42), 20_000), &ctx).is_none());
        let detection = detector.process(&tick(dec!(0.45), 40_000), &ctx).unwrap();

        match detection.details {
            SignalDetails::PriceSpike { from_price, change, .. } => {
                assert_eq!(from_price, dec!(0.40));
                assert_eq!(change, dec!(0.125));
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn old_prices_leave_the_window() {
        let store = MarketStateStore::new(StoreConfig::default());
        let ctx = DetectionContext { store: &store, now_ms: 0 };
        let mut detector = detector();

        detector.process(&tick(dec!(0.40), 0), &ctx);
        detector.process(&tick(dec!(0.44), 50_000), &ctx);
        // 0.40 is outside the 60s window at 70s; 0.44 -> 0.46 is < 10%.
        assert!(detector.process(&tick(dec!(0.46), 70_000), &ctx).is_none());
    }

    #[test]
    fn drops_count_as_spikes() {
        let store = MarketStateStore::new(StoreConfig::default());
        let ctx = DetectionContext { store: &store, now_ms: 0 };
        let mut detector = detector();

        detector.process(&tick(dec!(0.50), 0), &ctx);
        assert!(detector.process(&tick(dec!(0.40), 1_000), &ctx).is_some());
    }

    #[test]
    fn volume_gate_uses_listing() {
        let mut store = MarketStateStore::new(StoreConfig::default());
        let mut detector = SpikeDetector::new(SpikeConfig {
            min_volume: dec!(10000),
            ..SpikeConfig::default()
        });

        {
            let ctx = DetectionContext { store: &store, now_ms: 0 };
            detector.process(&tick(dec!(0.50), 0), &ctx);
            // Unknown volume is skipped while the gate is on.
            assert!(detector.process(&tick(dec!(0.30), 1_000), &ctx).is_none());
        }

        let mut listing = MarketListing::new(Venue::Polymarket, "M");
        listing.volume_24h = dec!(50000);
        store.register_listing(&listing, 0);
        let ctx = DetectionContext { store: &store, now_ms: 0 };
        assert!(detector.process(&tick(dec!(0.20), 2_000), &ctx).is_some());
    }
}
