//! Bounded per-detector log of recent signals.

use std::collections::VecDeque;

use super::signal::Signal;

/// Ring of the most recent signals; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct AlertHistory {
    capacity: usize,
    entries: VecDeque<Signal>,
}

impl AlertHistory {
    /// Create an empty ring.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a signal, evicting the oldest when full.
    pub fn push(&mut self, signal: Signal) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(signal);
    }

    /// Up to `limit` signals, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Signal> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Number of retained signals.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ring is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::signal::{SignalDetails, SignalKind, Strength};
    use crate::market::{MarketMeta, Outcome, Venue};
    use rust_decimal_macros::dec;

    fn signal(id: u64) -> Signal {
        Signal {
            id,
            kind: SignalKind::LargeTrade,
            venue: Venue::Kalshi,
            market_id: format!("m{id}"),
            token_id: None,
            meta: MarketMeta::default(),
            strength: Strength::Low,
            timestamp_ms: id as i64,
            correlation_id: String::new(),
            details: SignalDetails::LargeTrade {
                price: dec!(0.5),
                size: dec!(1),
                value: dec!(0.5),
                side: None,
                outcome: Outcome::Unknown,
                trader: None,
            },
        }
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut history = AlertHistory::new(3);
        for id in 1..=5 {
            history.push(signal(id));
        }

        let ids: Vec<u64> = history.recent(10).iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn recent_respects_limit() {
        let mut history = AlertHistory::new(10);
        history.push(signal(1));
        history.push(signal(2));
        assert_eq!(history.recent(1)[0].id, 2);
        assert_eq!(history.len(), 2);
    }
}
