//! Position changes of ranked traders.
//!
//! Each address's first snapshot is a baseline. Later snapshots are diffed
//! against the previous one per held token and classified as open, add,
//! reduce or close.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use tracing::debug;

use super::signal::{PositionAction, SignalDetails, SignalKind, Strength};
use super::{Detection, DetectionContext, Detector, ScanInput};
use crate::market::{PositionSnapshot, RankedTrader, TraderPosition, Venue};
use crate::normalizer::NormalizedEvent;

/// Smart money thresholds.
#[derive(Debug, Clone)]
pub struct SmartMoneyConfig {
    /// Leaderboard ranks tracked; traders ranked below this are ignored.
    pub track_top_n: usize,
    /// Minimum USD value of the position involved.
    pub min_position_value: Decimal,
    /// Minimum relative size change for add/reduce.
    pub change_threshold: Decimal,
    /// Minimum time between signals for one address and market.
    pub cooldown_ms: i64,
}

impl Default for SmartMoneyConfig {
    fn default() -> Self {
        Self {
            track_top_n: 50,
            min_position_value: Decimal::new(5_000, 0),
            change_threshold: Decimal::new(20, 2),
            cooldown_ms: 3_600_000,
        }
    }
}

/// Detects opens, adds, reduces and closes by tracked traders.
#[derive(Debug)]
pub struct SmartMoneyDetector {
    config: SmartMoneyConfig,
    /// Address -> positions by token id from the last snapshot.
    snapshots: HashMap<String, HashMap<String, TraderPosition>>,
}

impl SmartMoneyDetector {
    /// Create a detector.
    pub fn new(config: SmartMoneyConfig) -> Self {
        Self {
            config,
            snapshots: HashMap::new(),
        }
    }

    /// Addresses with a baseline.
    pub fn tracked(&self) -> usize {
        self.snapshots.len()
    }

    fn within_top_n(&self, trader: &RankedTrader) -> bool {
        usize::try_from(trader.rank).map_or(false, |rank| rank <= self.config.track_top_n)
    }

    fn retain_leaderboard(&mut self, traders: &[RankedTrader]) {
        let keep: HashSet<String> = traders
            .iter()
            .filter(|t| self.within_top_n(t))
            .map(|t| t.address.to_lowercase())
            .collect();
        let before = self.snapshots.len();
        self.snapshots.retain(|address, _| keep.contains(address));
        let dropped = before - self.snapshots.len();
        if dropped > 0 {
            debug!(dropped, "Dropped traders that left the leaderboard");
        }
    }

    fn diff(&mut self, snapshot: &PositionSnapshot, ctx: &DetectionContext<'_>) -> Vec<Detection> {
        let address = snapshot.trader.address.to_lowercase();
        if !self.within_top_n(&snapshot.trader) {
            self.snapshots.remove(&address);
            return Vec::new();
        }
        let current: HashMap<String, TraderPosition> = snapshot
            .positions
            .iter()
            .filter(|p| p.size > Decimal::ZERO)
            .map(|p| (p.token_id.clone(), p.clone()))
            .collect();

        let Some(previous) = self.snapshots.insert(address.clone(), current) else {
            debug!(address = %address, positions = snapshot.positions.len(), "Smart-money baseline");
            return Vec::new();
        };

        let mut changes: Vec<(PositionAction, Option<&TraderPosition>, &TraderPosition)> = Vec::new();
        for position in snapshot.positions.iter().filter(|p| p.size > Decimal::ZERO) {
            match previous.get(&position.token_id) {
                None => changes.push((PositionAction::Open, None, position)),
                Some(prev) => {
                    let change = relative_change(prev.size, position.size);
                    if change >= self.config.change_threshold {
                        changes.push((PositionAction::Add, Some(prev), position));
                    } else if change <= -self.config.change_threshold {
                        changes.push((PositionAction::Reduce, Some(prev), position));
                    }
                }
            }
        }
        let Some(current) = self.snapshots.get(&address) else {
            return Vec::new();
        };
        let mut closed: Vec<&TraderPosition> = previous
            .values()
            .filter(|p| !current.contains_key(&p.token_id))
            .collect();
        closed.sort_by(|a, b| a.token_id.cmp(&b.token_id));
        for prev in closed {
            changes.push((PositionAction::Close, Some(prev), prev));
        }

        changes
            .into_iter()
            .filter_map(|(action, prev, position)| {
                self.detection(&snapshot.trader, &address, action, prev, position, ctx)
            })
            .collect()
    }

    fn detection(
        &self,
        trader: &RankedTrader,
        address: &str,
        action: PositionAction,
        previous: Option<&TraderPosition>,
        position: &TraderPosition,
        ctx: &DetectionContext<'_>,
    ) -> Option<Detection> {
        let previous_size = previous.map_or(Decimal::ZERO, |p| p.size);
        let (current_size, value) = match action {
            PositionAction::Open | PositionAction::Add => (position.size, position.value),
            PositionAction::Reduce => (position.size, previous.map_or(position.value, |p| p.value)),
            PositionAction::Close => (Decimal::ZERO, position.value),
        };
        if value < self.config.min_position_value {
            return None;
        }
        let change = match action {
            PositionAction::Open => Decimal::ONE,
            PositionAction::Close => -Decimal::ONE,
            _ => relative_change(previous_size, current_size),
        };

        let mut meta = position.meta.clone();
        meta.merge_missing(&ctx.store.market_meta(&position.market_id));
        Some(Detection {
            key: format!("{}:{}", address, position.market_id),
            venue: Venue::Polymarket,
            market_id: position.market_id.clone(),
            token_id: Some(position.token_id.clone()),
            meta,
            strength: Strength::from_ratio(value, self.config.min_position_value),
            details: SignalDetails::SmartMoney {
                address: address.to_string(),
                rank: trader.rank,
                trader_name: trader.name.clone(),
                action,
                outcome: position.outcome,
                previous_size,
                current_size,
                change,
                value,
            },
        })
    }
}

fn relative_change(previous: Decimal, current: Decimal) -> Decimal {
    if previous.is_zero() {
        return Decimal::ONE;
    }
    (current - previous) / previous
}

impl Detector for SmartMoneyDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::SmartMoney
    }

    fn cooldown_ms(&self) -> i64 {
        self.config.cooldown_ms
    }

    fn process(&mut self, _event: &NormalizedEvent, _ctx: &DetectionContext<'_>) -> Option<Detection> {
        None
    }

    fn scan(&mut self, input: ScanInput<'_>, ctx: &DetectionContext<'_>) -> Vec<Detection> {
        match input {
            ScanInput::Leaderboard(traders) => {
                self.retain_leaderboard(traders);
                Vec::new()
            }
            ScanInput::Positions(snapshot) => self.diff(snapshot, ctx),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketMeta, Outcome};
    use crate::store::{MarketStateStore, StoreConfig};
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn trader() -> RankedTrader {
        RankedTrader {
            address: "0xABC".to_string(),
            rank: 3,
            name: Some("whale".to_string()),
            pnl: dec!(250000),
        }
    }

    fn position(token: &str, size: Decimal, value: Decimal) -> TraderPosition {
        TraderPosition {
            market_id: format!("m-{token}"),
            token_id: token.to_string(),
            outcome: Outcome::Yes,
            size,
            value,
            avg_price: dec!(0.5),
            meta: MarketMeta::default(),
        }
    }

    fn snapshot(positions: Vec<TraderPosition>) -> PositionSnapshot {
        PositionSnapshot {
            trader: trader(),
            positions,
            fetched_ms: 0,
        }
    }

    fn actions(detector: &mut SmartMoneyDetector, snap: &PositionSnapshot) -> Vec<(String, PositionAction)> {
        let store = MarketStateStore::new(StoreConfig::default());
        let ctx = DetectionContext { store: &store, now_ms: 0 };
        detector
            .scan(ScanInput::Positions(snap), &ctx)
            .into_iter()
            .map(|d| match d.details {
                SignalDetails::SmartMoney { action, .. } => (d.key, action),
                other => panic!("unexpected details {other:?}"),
            })
            .collect()
    }

    #[test]
    fn first_snapshot_is_baseline() {
        let mut detector = SmartMoneyDetector::new(SmartMoneyConfig::default());
        let snap = snapshot(vec![position("a", dec!(20000), dec!(10000))]);
        assert!(actions(&mut detector, &snap).is_empty());
        assert_eq!(detector.tracked(), 1);
    }

    #[test]
    fn classifies_every_action() {
        let mut detector = SmartMoneyDetector::new(SmartMoneyConfig::default());
        actions(
            &mut detector,
            &snapshot(vec![
                position("add", dec!(10000), dec!(6000)),
                position("reduce", dec!(10000), dec!(6000)),
                position("hold", dec!(10000), dec!(6000)),
                position("close", dec!(10000), dec!(6000)),
            ]),
        );

        let result = actions(
            &mut detector,
            &snapshot(vec![
                position("add", dec!(12000), dec!(7200)),
                position("reduce", dec!(8000), dec!(4800)),
                position("hold", dec!(11000), dec!(6600)),
                position("open", dec!(20000), dec!(9000)),
            ]),
        );

        assert_eq!(
            result,
            vec![
                ("0xabc:m-add".to_string(), PositionAction::Add),
                ("0xabc:m-reduce".to_string(), PositionAction::Reduce),
                ("0xabc:m-open".to_string(), PositionAction::Open),
                ("0xabc:m-close".to_string(), PositionAction::Close),
            ]
        );
    }

    #[test]
    fn small_positions_are_ignored() {
        let mut detector = SmartMoneyDetector::new(SmartMoneyConfig::default());
        actions(&mut detector, &snapshot(vec![]));
        let result = actions(&mut detector, &snapshot(vec![position("tiny", dec!(100), dec!(50))]));
        assert!(result.is_empty());
    }

    #[test]
    fn leaderboard_drop_clears_baseline() {
        let mut detector = SmartMoneyDetector::new(SmartMoneyConfig::default());
        actions(&mut detector, &snapshot(vec![]));

        let store = MarketStateStore::new(StoreConfig::default());
        let ctx = DetectionContext { store: &store, now_ms: 0 };
        detector.scan(ScanInput::Leaderboard(&[]), &ctx);
        assert_eq!(detector.tracked(), 0);

        // Re-entering the board starts from a fresh baseline.
        let snap = snapshot(vec![position("a", dec!(20000), dec!(10000))]);
        assert!(actions(&mut detector, &snap).is_empty());
    }

    #[test]
    fn traders_outside_top_n_are_not_tracked() {
        let mut detector = SmartMoneyDetector::new(SmartMoneyConfig {
            track_top_n: 2,
            ..SmartMoneyConfig::default()
        });
        // Rank 3 is outside a top-2 board.
        actions(&mut detector, &snapshot(vec![]));
        let result = actions(&mut detector, &snapshot(vec![position("a", dec!(20000), dec!(10000))]));
        assert!(result.is_empty());
        assert_eq!(detector.tracked(), 0);

        let store = MarketStateStore::new(StoreConfig::default());
        let ctx = DetectionContext { store: &store, now_ms: 0 };
        let mut inside = SmartMoneyDetector::new(SmartMoneyConfig::default());
        actions(&mut inside, &snapshot(vec![]));
        let board = [RankedTrader { rank: 60, ..trader() }];
        inside.scan(ScanInput::Leaderboard(&board), &ctx);
        assert_eq!(inside.tracked(), 0);
    }
}
