//! Mutable price ladder for venues that stream incremental book deltas.

use std::collections::HashMap;

use rust_decimal::Decimal;

use super::types::PriceLevel;

/// One side of a book maintained from snapshot + delta messages.
#[derive(Debug, Clone, Default)]
pub struct PriceLadder {
    /// price -> size.
    levels: HashMap<Decimal, Decimal>,
}

impl PriceLadder {
    /// Replace every level.
    pub fn apply_snapshot(&mut self, levels: impl IntoIterator<Item = (Decimal, Decimal)>) {
        self.levels.clear();
        for (price, size) in levels {
            if size > Decimal::ZERO {
                self.levels.insert(price, size);
            }
        }
    }

    /// Set the absolute size at `price`. Zero or negative removes the level.
    pub fn set(&mut self, price: Decimal, size: Decimal) {
        if size <= Decimal::ZERO {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, size);
        }
    }

    /// Add a signed change to the size at `price`.
    pub fn apply_delta(&mut self, price: Decimal, delta: Decimal) {
        let current = self.levels.get(&price).copied().unwrap_or(Decimal::ZERO);
        self.set(price, current + delta);
    }

    /// Number of non-empty levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether the ladder has no levels.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Levels sorted by price descending.
    pub fn descending(&self) -> Vec<PriceLevel> {
        let mut levels: Vec<PriceLevel> = self
            .levels
            .iter()
            .map(|(&price, &size)| PriceLevel { price, size })
            .collect();
        levels.sort_by(|a, b| b.price.cmp(&a.price));
        levels
    }
}
