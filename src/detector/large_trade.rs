//! Single trade prints over a notional floor.

use rust_decimal::Decimal;

use super::signal::{SignalDetails, SignalKind, Strength};
use super::{Detection, DetectionContext, Detector};
use crate::normalizer::{EventPayload, NormalizedEvent};

/// Large trade thresholds.
#[derive(Debug, Clone)]
pub struct LargeTradeConfig {
    /// `price * size` in USD a trade must exceed.
    pub min_value: Decimal,
    /// Minimum time between signals for one market.
    pub cooldown_ms: i64,
}

impl Default for LargeTradeConfig {
    fn default() -> Self {
        Self {
            min_value: Decimal::new(10_000, 0),
            cooldown_ms: 60_000,
        }
    }
}

/// Detects single trades worth more than the floor.
#[derive(Debug)]
pub struct LargeTradeDetector {
    config: LargeTradeConfig,
}

impl LargeTradeDetector {
    /// Create a detector.
    pub fn new(config: LargeTradeConfig) -> Self {
        Self { config }
    }
}

impl Detector for LargeTradeDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::LargeTrade
    }

    fn cooldown_ms(&self) -> i64 {
        self.config.cooldown_ms
    }

    fn process(&mut self, event: &NormalizedEvent, ctx: &DetectionContext<'_>) -> Option<Detection> {
        let EventPayload::Trade {
            price,
            size,
            side,
            trader,
        } = &event.payload
        else {
            return None;
        };
        if *price <= Decimal::ZERO || *size <= Decimal::ZERO {
            return None;
        }

        let value = *price * *size;
        if value <= self.config.min_value {
            return None;
        }

        let outcome = match event.token_id.as_deref() {
            Some(token) => ctx
                .store
                .token_outcome(token)
                .map(|(_, outcome)| outcome)
                .unwrap_or(event.outcome),
            None => event.outcome,
        };
        let mut meta = event.meta.clone();
        meta.merge_missing(&ctx.store.market_meta(&event.market_id));
        Some(Detection {
            key: event.market_id.clone(),
            venue: event.venue,
            market_id: event.market_id.clone(),
            token_id: event.token_id.clone(),
            meta,
            strength: Strength::from_ratio(value, self.config.min_value),
            details: SignalDetails::LargeTrade {
                price: *price,
                size: *size,
                value,
                side: *side,
                outcome,
                trader: trader.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketListing, MarketMeta, Outcome, Venue};
    use crate::orderbook::Side;
    use crate::store::{MarketStateStore, StoreConfig};
    use rust_decimal_macros::dec;

    fn trade(price: Decimal, size: Decimal) -> NormalizedEvent {
        NormalizedEvent {
            venue: Venue::Polymarket,
            market_id: "M".to_string(),
            token_id: Some("no-token".to_string()),
            outcome: Outcome::Unknown,
            timestamp_ms: 0,
            meta: MarketMeta::default(),
            payload: EventPayload::Trade {
                price,
                size,
                side: Some(Side::Bid),
                trader: Some("0xabc".to_string()),
            },
        }
    }

    #[test]
    fn fires_only_above_the_floor() {
        let store = MarketStateStore::new(StoreConfig::default());
        let ctx = DetectionContext { store: &store, now_ms: 0 };
        let mut detector = LargeTradeDetector::new(LargeTradeConfig::default());

        assert!(detector.process(&trade(dec!(0.5), dec!(19999)), &ctx).is_none());
        // Exactly 10000 does not exceed the floor.
        assert!(detector.process(&trade(dec!(0.5), dec!(20000)), &ctx).is_none());
        let detection = detector.process(&trade(dec!(0.5), dec!(20001)), &ctx).unwrap();
        assert_eq!(detection.key, "M");
        assert_eq!(detection.strength, Strength::Low);
        match detection.details {
            SignalDetails::LargeTrade { value, trader, .. } => {
                assert_eq!(value, dec!(10000.5));
                assert_eq!(trader.as_deref(), Some("0xabc"));
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn outcome_comes_from_listing_registration() {
        let mut store = MarketStateStore::new(StoreConfig::default());
        let mut listing = MarketListing::new(Venue::Polymarket, "M");
        listing.yes_token_id = Some("yes-token".to_string());
        listing.no_token_id = Some("no-token".to_string());
        store.register_listing(&listing, 0);

        let ctx = DetectionContext { store: &store, now_ms: 0 };
        let detection = LargeTradeDetector::new(LargeTradeConfig::default())
            .process(&trade(dec!(0.9), dec!(50000)), &ctx)
            .unwrap();
        assert_eq!(detection.strength, Strength::High);
        match detection.details {
            SignalDetails::LargeTrade { outcome, .. } => assert_eq!(outcome, Outcome::No),
            other => panic!("unexpected details {other:?}"),
        }
    }
}
