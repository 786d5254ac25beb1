//! Newly listed markets, detected by diffing listing scans.
//!
//! The first scan of a venue that ends without a failed page is a baseline:
//! it only seeds the seen set. A scan stopped by the page or time guard
//! counts, so a venue too large to list in one scan still leaves baseline. Every later scan signals the ids that are not in the set. Ids absent
//! from scans for longer than the TTL are forgotten, so a market that is
//! delisted and relisted fires again.

use std::collections::HashMap;

use tracing::{debug, info};

use super::signal::{SignalDetails, SignalKind, Strength};
use super::{Detection, DetectionContext, Detector, ScanInput};
use crate::market::{ListingScan, Venue};
use crate::normalizer::NormalizedEvent;
use crate::store::InsertionOrderCache;

/// New market parameters.
#[derive(Debug, Clone)]
pub struct NewMarketConfig {
    /// How long an id stays seen without appearing in a scan.
    pub ttl_ms: i64,
    /// Maximum ids remembered per venue.
    pub capacity: usize,
}

impl Default for NewMarketConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 7 * 24 * 3_600_000,
            capacity: 100_000,
        }
    }
}

#[derive(Debug)]
struct VenueSeen {
    /// Market id -> last scan that contained it.
    seen: InsertionOrderCache<String, i64>,
    baseline_done: bool,
}

/// Detects market ids that appear for the first time.
#[derive(Debug)]
pub struct NewMarketDetector {
    config: NewMarketConfig,
    venues: HashMap<Venue, VenueSeen>,
}

impl NewMarketDetector {
    /// Create a detector.
    pub fn new(config: NewMarketConfig) -> Self {
        Self {
            config,
            venues: HashMap::new(),
        }
    }

    /// Whether the baseline of `venue` has completed.
    pub fn baseline_done(&self, venue: Venue) -> bool {
        self.venues.get(&venue).is_some_and(|v| v.baseline_done)
    }

    fn diff(&mut self, scan: &ListingScan, now_ms: i64) -> Vec<Detection> {
        let capacity = self.config.capacity;
        let state = self.venues.entry(scan.venue).or_insert_with(|| VenueSeen {
            seen: InsertionOrderCache::new(capacity),
            baseline_done: false,
        });

        let mut detections = Vec::new();
        for listing in &scan.listings {
            if let Some(last_seen) = state.seen.get_mut(listing.market_id.as_str()) {
                *last_seen = now_ms;
                continue;
            }
            state.seen.insert(listing.market_id.clone(), now_ms);
            if !state.baseline_done || listing.closed {
                continue;
            }
            detections.push(Detection {
                key: listing.market_id.clone(),
                venue: scan.venue,
                market_id: listing.market_id.clone(),
                token_id: None,
                meta: listing.meta.clone(),
                strength: Strength::Medium,
                details: SignalDetails::NewMarket {
                    listing: listing.clone(),
                },
            });
        }

        if !state.baseline_done {
            if scan.ended_cleanly() {
                state.baseline_done = true;
                info!(
                    venue = %scan.venue,
                    seen = state.seen.len(),
                    "New-market baseline complete"
                );
            } else {
                debug!(
                    venue = %scan.venue,
                    seen = state.seen.len(),
                    error = ?scan.error,
                    "Failed scan seeded; baseline still pending"
                );
            }
        }

        let ttl = self.config.ttl_ms;
        let expired = state.seen.remove_where(|_, &last_seen| now_ms - last_seen > ttl);
        if !expired.is_empty() {
            debug!(venue = %scan.venue, count = expired.len(), "Re-armed expired market ids");
        }
        detections
    }
}

impl Detector for NewMarketDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::NewMarket
    }

    fn cooldown_ms(&self) -> i64 {
        0
    }

    fn process(&mut self, _event: &NormalizedEvent, _ctx: &DetectionContext<'_>) -> Option<Detection> {
        None
    }

    fn scan(&mut self, input: ScanInput<'_>, ctx: &DetectionContext<'_>) -> Vec<Detection> {
        match input {
            ScanInput::Listings(scan) => self.diff(scan, ctx.now_ms),
            _ => Vec::new(),
        }
    }
}
