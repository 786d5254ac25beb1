//! Ranked batch of markets about to stop trading.
//!
//! Each listing scan is filtered to open markets ending within the window
//! and scored:
//!
//! ```text
//! score = 0.40 * (1 - remaining / window)
//!       + 0.25 * min(1, log10(volume + 1) / 6)
//!       + 0.20 * min(1, log10(liquidity + 1) / 6)
//!       + 0.15 * |price - 0.5| * 2
//! ```
//!
//! The top N form the batch. A batch is only re-emitted when its digest,
//! the sorted list of member ids, differs from the last emitted one.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use super::signal::{ClosingSoonEntry, Signal, SignalDetails, SignalKind, Strength};
use super::{Detection, DetectionContext, Detector, ScanInput};
use crate::market::{ListingScan, MarketListing, Venue};
use crate::normalizer::NormalizedEvent;

const WEIGHT_TIME: f64 = 0.40;
const WEIGHT_VOLUME: f64 = 0.25;
const WEIGHT_LIQUIDITY: f64 = 0.20;
const WEIGHT_PRICE: f64 = 0.15;

/// Closing-soon parameters.
#[derive(Debug, Clone)]
pub struct ClosingSoonConfig {
    /// Horizon before close.
    pub window_ms: i64,
    /// Batch size.
    pub top_n: usize,
    /// Minimum 24h volume of a member.
    pub min_volume: Decimal,
}

impl Default for ClosingSoonConfig {
    fn default() -> Self {
        Self {
            window_ms: 24 * 3_600_000,
            top_n: 10,
            min_volume: Decimal::new(1_000, 0),
        }
    }
}

/// `log10(x + 1) / 6`, capped at 1. Six decades is $1M.
fn log_scale(value: Decimal) -> f64 {
    let v = value.to_f64().unwrap_or(0.0).max(0.0);
    ((v + 1.0).log10() / 6.0).min(1.0)
}

/// Composite ranking score in `[0, 1]`.
pub fn score(listing: &MarketListing, remaining_ms: i64, window_ms: i64) -> f64 {
    let time = if window_ms > 0 {
        (1.0 - remaining_ms as f64 / window_ms as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let extremity = listing
        .last_price
        .and_then(|p| p.to_f64())
        .map(|p| ((p - 0.5).abs() * 2.0).min(1.0))
        .unwrap_or(0.0);

    WEIGHT_TIME * time
        + WEIGHT_VOLUME * log_scale(listing.volume_24h)
        + WEIGHT_LIQUIDITY * log_scale(listing.liquidity)
        + WEIGHT_PRICE * extremity
}

/// Emits the ranked closing-soon batch when its membership changes.
#[derive(Debug)]
pub struct ClosingSoonDetector {
    config: ClosingSoonConfig,
    last_digest: HashMap<Venue, String>,
}

impl ClosingSoonDetector {
    /// Create a detector.
    pub fn new(config: ClosingSoonConfig) -> Self {
        Self {
            config,
            last_digest: HashMap::new(),
        }
    }

    /// Ranked members of `scan` at `now_ms`, best first.
    pub fn rank(&self, scan: &ListingScan, now_ms: i64) -> Vec<ClosingSoonEntry> {
        let mut entries: Vec<ClosingSoonEntry> = scan
            .listings
            .iter()
            .filter(|l| !l.closed && l.volume_24h >= self.config.min_volume)
            .filter_map(|l| {
                let remaining = l.time_remaining_ms(now_ms)?;
                if remaining > self.config.window_ms {
                    return None;
                }
                Some(ClosingSoonEntry {
                    market_id: l.market_id.clone(),
                    meta: l.meta.clone(),
                    end_time_ms: l.end_time_ms?,
                    time_remaining_ms: remaining,
                    volume_24h: l.volume_24h,
                    liquidity: l.liquidity,
                    price: l.last_price,
                    score: score(l, remaining, self.config.window_ms),
                })
            })
            .collect();

        entries.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.market_id.cmp(&b.market_id))
        });
        entries.truncate(self.config.top_n);
        entries
    }

    fn batch(&mut self, scan: &ListingScan, now_ms: i64) -> Option<Detection> {
        let markets = self.rank(scan, now_ms);
        let Some(top) = markets.first() else {
            self.last_digest.remove(&scan.venue);
            return None;
        };

        let mut ids: Vec<&str> = markets.iter().map(|m| m.market_id.as_str()).collect();
        ids.sort_unstable();
        let digest = ids.join(",");
        if self.last_digest.get(&scan.venue) == Some(&digest) {
            debug!(venue = %scan.venue, "Closing-soon batch unchanged");
            return None;
        }

        let strength = match top.score {
            s if s >= 0.75 => Strength::High,
            s if s >= 0.5 => Strength::Medium,
            _ => Strength::Low,
        };
        let market_id = top.market_id.clone();
        let meta = top.meta.clone();
        Some(Detection {
            key: "batch".to_string(),
            venue: scan.venue,
            market_id,
            token_id: None,
            meta,
            strength,
            details: SignalDetails::ClosingSoon { markets, digest },
        })
    }
}

impl Detector for ClosingSoonDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::ClosingSoon
    }

    fn cooldown_ms(&self) -> i64 {
        0
    }

    fn process(&mut self, _event: &NormalizedEvent, _ctx: &DetectionContext<'_>) -> Option<Detection> {
        None
    }

    fn scan(&mut self, input: ScanInput<'_>, ctx: &DetectionContext<'_>) -> Vec<Detection> {
        match input {
            ScanInput::ClosingWindow(scan) => self.batch(scan, ctx.now_ms).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn committed(&mut self, signal: &Signal) {
        if let SignalDetails::ClosingSoon { digest, .. } = &signal.details {
            self.last_digest.insert(signal.venue, digest.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MarketStateStore, StoreConfig};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const HOUR: i64 = 3_600_000;

    fn listing(id: &str, ends_in_ms: i64, volume: Decimal) -> MarketListing {
        let mut listing = MarketListing::new(Venue::Polymarket, id);
        listing.end_time_ms = Some(ends_in_ms);
        listing.volume_24h = volume;
        listing.liquidity = dec!(5000);
        listing.last_price = Some(dec!(0.5));
        listing
    }

    fn scan(listings: Vec<MarketListing>) -> ListingScan {
        ListingScan::complete(Venue::Polymarket, listings)
    }

    #[test]
    fn ranks_by_time_left_and_filters_window() {
        let detector = ClosingSoonDetector::new(ClosingSoonConfig::default());
        let mut closed = listing("closed", HOUR, dec!(50000));
        closed.closed = true;

        let ranked = detector.rank(
            &scan(vec![
                listing("late", 20 * HOUR, dec!(50000)),
                listing("soon", HOUR, dec!(50000)),
                listing("outside", 30 * HOUR, dec!(50000)),
                listing("thin", HOUR, dec!(10)),
                listing("past", -HOUR, dec!(50000)),
                closed,
            ]),
            0,
        );

        let ids: Vec<&str> = ranked.iter().map(|e| e.market_id.as_str()).collect();
        assert_eq!(ids, vec!["soon", "late"]);
        assert!(ranked[0].score > ranked[1].score);
        assert!(ranked[0].score <= 1.0);
    }

    #[test]
    fn score_weights_sum_to_one() {
        let mut l = listing("x", 0, dec!(999999));
        l.liquidity = dec!(999999);
        l.last_price = Some(dec!(1));
        let s = score(&l, 0, HOUR);
        assert!((s - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unchanged_membership_is_not_reemitted() {
        let store = MarketStateStore::new(StoreConfig::default());
        let ctx = DetectionContext { store: &store, now_ms: 0 };
        let mut detector = ClosingSoonDetector::new(ClosingSoonConfig::default());
        let first = scan(vec![listing("a", HOUR, dec!(5000)), listing("b", 2 * HOUR, dec!(5000))]);

        let detections = detector.scan(ScanInput::ClosingWindow(&first), &ctx);
        assert_eq!(detections.len(), 1);
        let digest = match &detections[0].details {
            SignalDetails::ClosingSoon { digest, .. } => digest.clone(),
            other => panic!("unexpected details {other:?}"),
        };
        assert_eq!(digest, "a,b");

        // Not committed (e.g. suppressed): the same batch may fire again.
        assert_eq!(detector.scan(ScanInput::ClosingWindow(&first), &ctx).len(), 1);

        detector.last_digest.insert(Venue::Polymarket, digest);
        let mut moved = first.clone();
        moved.listings[0].volume_24h = dec!(900000);
        assert!(detector.scan(ScanInput::ClosingWindow(&moved), &ctx).is_empty());

        let grown = scan(vec![listing("a", HOUR, dec!(5000)), listing("c", HOUR, dec!(5000))]);
        assert_eq!(detector.scan(ScanInput::ClosingWindow(&grown), &ctx).len(), 1);
    }
}
