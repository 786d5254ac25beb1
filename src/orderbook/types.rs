//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total size available at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// Dollar notional resting at this level.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }
}

/// Side of a book or a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    /// Bid / buy side.
    Bid,
    /// Ask / sell side.
    Ask,
}

impl Side {
    /// Parse venue side labels ("BUY", "sell", "bid", "yes" taker...).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "buy" | "bid" | "bids" => Some(Side::Bid),
            "sell" | "ask" | "asks" => Some(Side::Ask),
            _ => None,
        }
    }

    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

/// Full book for one token, replaced wholesale on every update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    /// Bid levels sorted by price descending (best first).
    pub bids: Vec<PriceLevel>,
    /// Ask levels sorted by price ascending (best first).
    pub asks: Vec<PriceLevel>,
    /// Unix milliseconds of the update.
    pub timestamp_ms: i64,
}

impl OrderBookSnapshot {
    /// Build a snapshot, sorting levels best-first and dropping empty ones.
    pub fn new(mut bids: Vec<PriceLevel>, mut asks: Vec<PriceLevel>, timestamp_ms: i64) -> Self {
        bids.retain(|l| l.size > Decimal::ZERO && l.price > Decimal::ZERO);
        asks.retain(|l| l.size > Decimal::ZERO && l.price > Decimal::ZERO);
        bids.sort_by(|a, b| b.price.cmp(&a.price)); // Descending
        asks.sort_by(|a, b| a.price.cmp(&b.price)); // Ascending
        Self {
            bids,
            asks,
            timestamp_ms,
        }
    }

    /// Levels for one side.
    pub fn levels(&self, side: Side) -> &[PriceLevel] {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Get the best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Dollar notional over the best `levels` levels of one side.
    pub fn depth_usd(&self, side: Side, levels: usize) -> Decimal {
        self.levels(side)
            .iter()
            .take(levels)
            .map(PriceLevel::notional)
            .sum()
    }
}

/// Result of walking one side of a book with a dollar budget.
#[derive(Debug, Clone, PartialEq)]
pub struct NotionalWalk {
    /// Dollars actually consumed.
    pub filled_notional: Decimal,
    /// Shares consumed.
    pub filled_size: Decimal,
    /// Best (first) price on the walked side.
    pub best_price: Decimal,
    /// Last price touched by the walk.
    pub worst_price: Decimal,
    /// Whether the side ran out before the budget was spent.
    pub exhausted: bool,
}

impl NotionalWalk {
    /// Relative distance between the best and the last touched price.
    pub fn price_impact(&self) -> Decimal {
        if self.best_price.is_zero() {
            return Decimal::ZERO;
        }
        ((self.worst_price - self.best_price) / self.best_price).abs()
    }
}
