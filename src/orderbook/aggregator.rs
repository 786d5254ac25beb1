//! Book walking and depth calculations.

use rust_decimal::Decimal;

use super::types::{NotionalWalk, OrderBookSnapshot, PriceLevel, Side};

/// Walk `levels` best-first, spending up to `budget` dollars.
///
/// Returns `None` when there is nothing to walk or the budget is not positive.
pub fn walk_notional(levels: &[PriceLevel], budget: Decimal) -> Option<NotionalWalk> {
    let best_price = levels.first()?.price;
    if budget <= Decimal::ZERO {
        return None;
    }

    let mut remaining = budget;
    let mut filled_size = Decimal::ZERO;
    let mut worst_price = best_price;

    for level in levels {
        if remaining <= Decimal::ZERO {
            break;
        }
        if level.price <= Decimal::ZERO {
            continue;
        }

        let take = remaining.min(level.notional());
        filled_size += take / level.price;
        remaining -= take;
        worst_price = level.price;
    }

    Some(NotionalWalk {
        filled_notional: budget - remaining.max(Decimal::ZERO),
        filled_size,
        best_price,
        worst_price,
        exhausted: remaining > Decimal::ZERO,
    })
}

/// Estimate the price impact of an aggressor spending `budget` dollars
/// against `book`'s `side`.
pub fn price_impact(book: &OrderBookSnapshot, side: Side, budget: Decimal) -> Option<NotionalWalk> {
    walk_notional(book.levels(side), budget)
}

/// Calculate the mid price from best bid and ask.
pub fn mid_price(book: &OrderBookSnapshot) -> Option<Decimal> {
    match (book.best_bid(), book.best_ask()) {
        (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
        _ => None,
    }
}

/// Share of the top-`levels` depth resting on the bid side, in `[0, 1]`.
pub fn bid_share(book: &OrderBookSnapshot, levels: usize) -> Option<Decimal> {
    let bids = book.depth_usd(Side::Bid, levels);
    let asks = book.depth_usd(Side::Ask, levels);
    let total = bids + asks;
    (!total.is_zero()).then(|| bids / total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn walk_single_level_within_budget() {
        let asks = vec![PriceLevel::new(dec!(0.50), dec!(100))];
        let walk = walk_notional(&asks, dec!(10)).unwrap();

        assert_eq!(walk.filled_notional, dec!(10));
        assert_eq!(walk.filled_size, dec!(20));
        assert_eq!(walk.worst_price, dec!(0.50));
        assert!(!walk.exhausted);
        assert_eq!(walk.price_impact(), Decimal::ZERO);
    }

    #[test]
    fn walk_crosses_multiple_levels() {
        let asks = vec![
            PriceLevel::new(dec!(0.40), dec!(500)),  // $200
            PriceLevel::new(dec!(0.44), dec!(1000)), // $440
        ];
        let walk = walk_notional(&asks, dec!(300)).unwrap();

        assert_eq!(walk.worst_price, dec!(0.44));
        assert_eq!(walk.price_impact(), dec!(0.1));
        assert!(!walk.exhausted);
    }

    #[test]
    fn walk_reports_exhaustion() {
        let asks = vec![PriceLevel::new(dec!(0.50), dec!(10))];
        let walk = walk_notional(&asks, dec!(100)).unwrap();

        assert!(walk.exhausted);
        assert_eq!(walk.filled_notional, dec!(5));
    }

    #[test]
    fn walk_rejects_empty_side_and_zero_budget() {
        assert!(walk_notional(&[], dec!(10)).is_none());
        let asks = vec![PriceLevel::new(dec!(0.50), dec!(10))];
        assert!(walk_notional(&asks, dec!(0)).is_none());
    }

    #[test]
    fn bid_walk_measures_downward_impact() {
        let book = OrderBookSnapshot::new(
            vec![
                PriceLevel::new(dec!(0.50), dec!(100)),
                PriceLevel::new(dec!(0.45), dec!(1000)),
            ],
            vec![],
            0,
        );
        let walk = price_impact(&book, Side::Bid, dec!(100)).unwrap();
        assert_eq!(walk.worst_price, dec!(0.45));
        assert_eq!(walk.price_impact(), dec!(0.1));
    }

    #[test]
    fn mid_and_bid_share() {
        let book = OrderBookSnapshot::new(
            vec![PriceLevel::new(dec!(0.48), dec!(100))],
            vec![PriceLevel::new(dec!(0.52), dec!(100))],
            0,
        );
        assert_eq!(mid_price(&book), Some(dec!(0.50)));
        // 48 / (48 + 52)
        assert_eq!(bid_share(&book, 3), Some(dec!(0.48)));
        assert_eq!(bid_share(&OrderBookSnapshot::default(), 3), None);
    }
}
