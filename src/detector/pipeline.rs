//! Runs every detector on the single dispatch path and applies the shared
//! rate gates.
//!
//! A panic inside one detector is caught, logged and counted; the remaining
//! detectors still see the same event.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use tracing::{debug, error, info};

use super::history::AlertHistory;
use super::signal::{Signal, SignalKind};
use super::{Detection, DetectionContext, Detector, ScanInput};
use crate::governor::{GovernorSnapshot, RateGovernor};
use crate::metrics;
use crate::normalizer::NormalizedEvent;
use crate::store::MarketStateStore;

/// Counters of one detector, exposed through `getStats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetectorStats {
    /// Events and scans evaluated.
    pub evaluations: u64,
    /// Detections that passed the detector's own gates.
    pub detections: u64,
    /// Signals emitted.
    pub emitted: u64,
    /// Detections suppressed by cooldown.
    pub suppressed_cooldown: u64,
    /// Detections suppressed by the hourly quota.
    pub suppressed_quota: u64,
    /// Evaluations that panicked.
    pub errors: u64,
    /// Unix milliseconds of the last emission.
    pub last_signal_ms: Option<i64>,
}

struct DetectorSlot {
    detector: Box<dyn Detector>,
    stats: DetectorStats,
    history: AlertHistory,
}

/// Owns the detectors, their stats and history, and the Rate Governor.
pub struct DetectorPipeline {
    slots: Vec<DetectorSlot>,
    governor: RateGovernor,
    next_signal_id: u64,
}

impl DetectorPipeline {
    /// Create a pipeline over `detectors`.
    pub fn new(detectors: Vec<Box<dyn Detector>>, governor: RateGovernor, history_size: usize) -> Self {
        let slots = detectors
            .into_iter()
            .map(|detector| DetectorSlot {
                detector,
                stats: DetectorStats::default(),
                history: AlertHistory::new(history_size),
            })
            .collect();
        Self {
            slots,
            governor,
            next_signal_id: 1,
        }
    }

    /// Kinds of the active detectors, in evaluation order.
    pub fn kinds(&self) -> Vec<SignalKind> {
        self.slots.iter().map(|s| s.detector.kind()).collect()
    }

    /// Stream mode: run every detector on one event.
    pub fn process_event(
        &mut self,
        event: &NormalizedEvent,
        store: &MarketStateStore,
        now_ms: i64,
    ) -> Vec<Signal> {
        let ctx = DetectionContext { store, now_ms };
        let mut signals = Vec::new();

        for slot in &mut self.slots {
            let kind = slot.detector.kind();
            slot.stats.evaluations += 1;
            let detector = &mut slot.detector;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.process(event, &ctx)));

            match outcome {
                Ok(Some(detection)) => {
                    if let Some(signal) =
                        Self::gate(&mut self.governor, &mut self.next_signal_id, slot, detection, now_ms)
                    {
                        signals.push(signal);
                    }
                }
                Ok(None) => {}
                Err(_) => Self::record_panic(slot, kind, "process"),
            }
        }
        signals
    }

    /// Batch mode: run every detector on one scan result.
    pub fn process_scan(
        &mut self,
        input: ScanInput<'_>,
        store: &MarketStateStore,
        now_ms: i64,
    ) -> Vec<Signal> {
        let ctx = DetectionContext { store, now_ms };
        let mut signals = Vec::new();

        for slot in &mut self.slots {
            let kind = slot.detector.kind();
            slot.stats.evaluations += 1;
            let detector = &mut slot.detector;
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.scan(input, &ctx)));

            match outcome {
                Ok(detections) => {
                    for detection in detections {
                        if let Some(signal) = Self::gate(
                            &mut self.governor,
                            &mut self.next_signal_id,
                            slot,
                            detection,
                            now_ms,
                        ) {
                            signals.push(signal);
                        }
                    }
                }
                Err(_) => Self::record_panic(slot, kind, "scan"),
            }
        }
        signals
    }

    /// Cooldown, then hourly quota, then emit.
    fn gate(
        governor: &mut RateGovernor,
        next_signal_id: &mut u64,
        slot: &mut DetectorSlot,
        detection: Detection,
        now_ms: i64,
    ) -> Option<Signal> {
        let kind = slot.detector.kind();
        let cooldown_ms = slot.detector.cooldown_ms();
        slot.stats.detections += 1;

        let key = format!("{}:{}:{}", kind, detection.venue, detection.key);
        if !governor.check_cooldown(&key, cooldown_ms, now_ms) {
            slot.stats.suppressed_cooldown += 1;
            metrics::inc_signals_suppressed(kind.as_str(), "cooldown");
            debug!(kind = %kind, key = %key, "Signal suppressed by cooldown");
            return None;
        }
        if !governor.check_hourly_quota(kind, now_ms) {
            slot.stats.suppressed_quota += 1;
            metrics::inc_signals_suppressed(kind.as_str(), "quota");
            debug!(kind = %kind, key = %key, "Signal suppressed by hourly quota");
            return None;
        }

        let signal = Signal {
            id: *next_signal_id,
            kind,
            venue: detection.venue,
            market_id: detection.market_id,
            token_id: detection.token_id,
            meta: detection.meta,
            strength: detection.strength,
            timestamp_ms: now_ms,
            correlation_id: key,
            details: detection.details,
        };
        *next_signal_id += 1;

        governor.record_emission(kind, &signal.correlation_id, cooldown_ms, now_ms);
        slot.stats.emitted += 1;
        slot.stats.last_signal_ms = Some(now_ms);
        slot.history.push(signal.clone());
        slot.detector.committed(&signal);
        metrics::inc_signals_emitted(kind.as_str());

        info!(
            kind = %kind,
            venue = %signal.venue,
            market = %signal.market_id,
            strength = %signal.strength,
            id = signal.id,
            "Signal emitted: {}",
            signal.label()
        );
        Some(signal)
    }

    fn record_panic(slot: &mut DetectorSlot, kind: SignalKind, stage: &'static str) {
        slot.stats.errors += 1;
        metrics::inc_detector_panics(kind.as_str());
        error!(kind = %kind, stage, "Detector panicked; continuing with remaining detectors");
    }

    /// Stats per detector.
    pub fn stats(&self) -> HashMap<SignalKind, DetectorStats> {
        self.slots
            .iter()
            .map(|s| (s.detector.kind(), s.stats.clone()))
            .collect()
    }

    /// Recent signals of one detector, newest first.
    pub fn alert_history(&self, kind: SignalKind, limit: usize) -> Vec<Signal> {
        self.slots
            .iter()
            .find(|s| s.detector.kind() == kind)
            .map(|s| s.history.recent(limit))
            .unwrap_or_default()
    }

    /// Rate Governor state.
    pub fn governor_snapshot(&self, now_ms: i64) -> GovernorSnapshot {
        self.governor.snapshot(now_ms)
    }

    /// Drop expired governor state.
    pub fn sweep(&mut self, now_ms: i64) -> usize {
        self.governor.sweep(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::signal::{SignalDetails, Strength};
    use crate::governor::GovernorConfig;
    use crate::market::{MarketMeta, Outcome, Venue};
    use crate::normalizer::EventPayload;
    use crate::store::StoreConfig;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    /// Fires on every trade, keyed by market.
    struct EveryTrade {
        cooldown_ms: i64,
    }

    impl Detector for EveryTrade {
        fn kind(&self) -> SignalKind {
            SignalKind::LargeTrade
        }

        fn cooldown_ms(&self) -> i64 {
            self.cooldown_ms
        }

        fn process(&mut self, event: &NormalizedEvent, _ctx: &DetectionContext<'_>) -> Option<Detection> {
            let EventPayload::Trade { price, size, .. } = &event.payload else {
                return None;
            };
            Some(Detection {
                key: event.market_id.clone(),
                venue: event.venue,
                market_id: event.market_id.clone(),
                token_id: None,
                meta: MarketMeta::default(),
                strength: Strength::Low,
                details: SignalDetails::LargeTrade {
                    price: *price,
                    size: *size,
                    value: *price * *size,
                    side: None,
                    outcome: Outcome::Unknown,
                    trader: None,
                },
            })
        }
    }

    struct Panics;

    impl Detector for Panics {
        fn kind(&self) -> SignalKind {
            SignalKind::Skew
        }

        fn cooldown_ms(&self) -> i64 {
            0
        }

        fn process(&mut self, _event: &NormalizedEvent, _ctx: &DetectionContext<'_>) -> Option<Detection> {
            panic!("boom");
        }
    }

    fn trade(market: &str) -> NormalizedEvent {
        NormalizedEvent {
            venue: Venue::Polymarket,
            market_id: market.to_string(),
            token_id: Some("t".to_string()),
            outcome: Outcome::Unknown,
            timestamp_ms: 0,
            meta: MarketMeta::default(),
            payload: EventPayload::Trade {
                price: dec!(0.5),
                size: dec!(100),
                side: None,
                trader: None,
            },
        }
    }

    fn pipeline(detectors: Vec<Box<dyn Detector>>, max_per_hour: usize) -> DetectorPipeline {
        DetectorPipeline::new(
            detectors,
            RateGovernor::new(GovernorConfig {
                max_signals_per_hour: max_per_hour,
                cooldown_capacity: 1_000,
            }),
            10,
        )
    }

    #[test]
    fn cooldown_yields_one_signal_per_key() {
        let store = MarketStateStore::new(StoreConfig::default());
        let mut pipeline = pipeline(vec![Box::new(EveryTrade { cooldown_ms: 60_000 })], 100);

        assert_eq!(pipeline.process_event(&trade("m"), &store, 1_000).len(), 1);
        assert_eq!(pipeline.process_event(&trade("m"), &store, 2_000).len(), 0);
        assert_eq!(pipeline.process_event(&trade("other"), &store, 2_000).len(), 1);

        let stats = &pipeline.stats()[&SignalKind::LargeTrade];
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.suppressed_cooldown, 1);
    }

    #[test]
    fn hourly_quota_caps_emissions() {
        let store = MarketStateStore::new(StoreConfig::default());
        let mut pipeline = pipeline(vec![Box::new(EveryTrade { cooldown_ms: 0 })], 3);

        let emitted: usize = (0..4)
            .map(|i| pipeline.process_event(&trade(&format!("m{i}")), &store, i * 1_000).len())
            .sum();

        assert_eq!(emitted, 3);
        assert_eq!(pipeline.stats()[&SignalKind::LargeTrade].suppressed_quota, 1);
    }

    #[test]
    fn panicking_detector_does_not_block_others() {
        let store = MarketStateStore::new(StoreConfig::default());
        let mut pipeline = pipeline(
            vec![Box::new(Panics), Box::new(EveryTrade { cooldown_ms: 0 })],
            100,
        );

        let signals = pipeline.process_event(&trade("m"), &store, 0);

        assert_eq!(signals.len(), 1);
        assert_eq!(pipeline.stats()[&SignalKind::Skew].errors, 1);
    }

    #[test]
    fn signals_get_increasing_ids_and_history() {
        let store = MarketStateStore::new(StoreConfig::default());
        let mut pipeline = pipeline(vec![Box::new(EveryTrade { cooldown_ms: 0 })], 100);

        pipeline.process_event(&trade("a"), &store, 0);
        pipeline.process_event(&trade("b"), &store, 1);

        let history = pipeline.alert_history(SignalKind::LargeTrade, 10);
        let ids: Vec<u64> = history.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(history[0].correlation_id, "large_trade:polymarket:b");
        assert!(pipeline.alert_history(SignalKind::Arbitrage, 10).is_empty());
    }
}
