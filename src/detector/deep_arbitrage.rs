//! Implied arbitrage through mirror books.
//!
//! In a binary market, buying YES is equivalent to selling NO at `1 - p`.
//! The cheapest way to acquire each leg is therefore the better of its own
//! ask and the mirror of the other leg's bid:
//!
//! ```text
//! effective_yes = min(ask_yes, 1 - bid_no)
//! effective_no  = min(ask_no,  1 - bid_yes)
//! ```
//!
//! The same identity applies on the sell side with bids and `max`. A
//! signal only fires when the effective prices beat the naive quotes, so it
//! never duplicates plain arbitrage.

use rust_decimal::Decimal;
use tracing::trace;

use super::arbitrage::{compute_quote, legs_usable};
use super::signal::{ArbDirection, ArbitrageQuote, SignalDetails, SignalKind, Strength};
use super::{Detection, DetectionContext, Detector};
use crate::normalizer::{EventKind, NormalizedEvent};
use crate::orderbook::{OrderBookSnapshot, Side};
use crate::store::DEPTH_LEVELS;

/// Implied arbitrage thresholds.
#[derive(Debug, Clone)]
pub struct DeepArbitrageConfig {
    /// Minimum net profit per $1 payout.
    pub min_profit: Decimal,
    /// Taker fee rate per leg.
    pub fee_rate: Decimal,
    /// Expected slippage per leg.
    pub slippage: Decimal,
    /// Minimum USD depth behind each effective price.
    pub min_depth: Decimal,
    /// Maximum age of either book.
    pub max_price_age_ms: i64,
    /// Maximum timestamp difference between the books.
    pub max_time_skew_ms: i64,
    /// Minimum time between signals for one market.
    pub cooldown_ms: i64,
}

impl Default for DeepArbitrageConfig {
    fn default() -> Self {
        Self {
            min_profit: Decimal::new(3, 3),
            fee_rate: Decimal::new(2, 3),
            slippage: Decimal::new(5, 3),
            min_depth: Decimal::new(100, 0),
            max_price_age_ms: 60_000,
            max_time_skew_ms: 30_000,
            cooldown_ms: 300_000,
        }
    }
}

/// One effective leg price and the book side backing it.
#[derive(Debug, Clone, Copy)]
struct EffectiveLeg {
    price: Decimal,
    via_mirror: bool,
    depth: Decimal,
}

/// Cheapest way to buy a leg: its own ask or the mirror of the other bid.
fn effective_buy(own: &OrderBookSnapshot, other: &OrderBookSnapshot) -> Option<EffectiveLeg> {
    let direct = own.best_ask().map(|ask| EffectiveLeg {
        price: ask,
        via_mirror: false,
        depth: own.depth_usd(Side::Ask, DEPTH_LEVELS),
    });
    let mirror = other.best_bid().map(|bid| EffectiveLeg {
        price: Decimal::ONE - bid,
        via_mirror: true,
        depth: other.depth_usd(Side::Bid, DEPTH_LEVELS),
    });
    match (direct, mirror) {
        (Some(d), Some(m)) => Some(if m.price < d.price { m } else { d }),
        (d, m) => d.or(m),
    }
}

/// Best way to sell a leg: its own bid or the mirror of the other ask.
fn effective_sell(own: &OrderBookSnapshot, other: &OrderBookSnapshot) -> Option<EffectiveLeg> {
    let direct = own.best_bid().map(|bid| EffectiveLeg {
        price: bid,
        via_mirror: false,
        depth: own.depth_usd(Side::Bid, DEPTH_LEVELS),
    });
    let mirror = other.best_ask().map(|ask| EffectiveLeg {
        price: Decimal::ONE - ask,
        via_mirror: true,
        depth: other.depth_usd(Side::Ask, DEPTH_LEVELS),
    });
    match (direct, mirror) {
        (Some(d), Some(m)) => Some(if m.price > d.price { m } else { d }),
        (d, m) => d.or(m),
    }
}

/// Profit of selling both legs at `yes` and `no`.
fn sell_quote(yes: Decimal, no: Decimal, fee_rate: Decimal, slippage: Decimal) -> ArbitrageQuote {
    let buy = compute_quote(yes, no, fee_rate, slippage);
    let gross_profit = buy.sum - Decimal::ONE;
    let net_profit = gross_profit - buy.total_fee - buy.total_slippage;
    ArbitrageQuote {
        gross_profit,
        net_profit,
        net_profit_percent: if buy.sum.is_zero() {
            Decimal::ZERO
        } else {
            net_profit / buy.sum * Decimal::ONE_HUNDRED
        },
        ..buy
    }
}

struct Candidate {
    direction: ArbDirection,
    yes: EffectiveLeg,
    no: EffectiveLeg,
    naive_total: Option<Decimal>,
    quote: ArbitrageQuote,
}

/// Detects arbitrage visible only through mirror-book pricing.
#[derive(Debug)]
pub struct DeepArbitrageDetector {
    config: DeepArbitrageConfig,
}

impl DeepArbitrageDetector {
    /// Create a detector.
    pub fn new(config: DeepArbitrageConfig) -> Self {
        Self { config }
    }

    fn buy_candidate(&self, yes: &OrderBookSnapshot, no: &OrderBookSnapshot) -> Option<Candidate> {
        let eff_yes = effective_buy(yes, no)?;
        let eff_no = effective_buy(no, yes)?;
        let naive_total = yes.best_ask().zip(no.best_ask()).map(|(a, b)| a + b);
        if naive_total.is_some_and(|naive| eff_yes.price + eff_no.price >= naive) {
            return None;
        }
        let quote = compute_quote(eff_yes.price, eff_no.price, self.config.fee_rate, self.config.slippage);
        Some(Candidate {
            direction: ArbDirection::BuyBoth,
            yes: eff_yes,
            no: eff_no,
            naive_total,
            quote,
        })
    }

    fn sell_candidate(&self, yes: &OrderBookSnapshot, no: &OrderBookSnapshot) -> Option<Candidate> {
        let eff_yes = effective_sell(yes, no)?;
        let eff_no = effective_sell(no, yes)?;
        let naive_total = yes.best_bid().zip(no.best_bid()).map(|(a, b)| a + b);
        if naive_total.is_some_and(|naive| eff_yes.price + eff_no.price <= naive) {
            return None;
        }
        let quote = sell_quote(eff_yes.price, eff_no.price, self.config.fee_rate, self.config.slippage);
        Some(Candidate {
            direction: ArbDirection::SellBoth,
            yes: eff_yes,
            no: eff_no,
            naive_total,
            quote,
        })
    }
}

impl Detector for DeepArbitrageDetector {
    fn kind(&self) -> SignalKind {
        SignalKind::DeepArbitrage
    }

    fn cooldown_ms(&self) -> i64 {
        self.config.cooldown_ms
    }

    fn process(&mut self, event: &NormalizedEvent, ctx: &DetectionContext<'_>) -> Option<Detection> {
        if event.kind() != EventKind::Book {
            return None;
        }
        let (yes_token, no_token) = ctx.store.find_market_tokens(&event.market_id)?.pair()?;
        let yes_book = ctx.store.get_book(yes_token)?;
        let no_book = ctx.store.get_book(no_token)?;

        if !legs_usable(
            yes_book.timestamp_ms,
            no_book.timestamp_ms,
            ctx.now_ms,
            self.config.max_price_age_ms,
            self.config.max_time_skew_ms,
        ) {
            trace!(market = %event.market_id, "Mirror books stale or desynchronized");
            return None;
        }

        let best = [
            self.buy_candidate(yes_book, no_book),
            self.sell_candidate(yes_book, no_book),
        ]
        .into_iter()
        .flatten()
        .filter(|c| c.quote.net_profit >= self.config.min_profit)
        .filter(|c| c.yes.depth.min(c.no.depth) >= self.config.min_depth)
        .max_by(|a, b| a.quote.net_profit.cmp(&b.quote.net_profit))?;

        let mut meta = event.meta.clone();
        meta.merge_missing(&ctx.store.market_meta(&event.market_id));
        Some(Detection {
            key: event.market_id.clone(),
            venue: event.venue,
            market_id: event.market_id.clone(),
            token_id: None,
            meta,
            strength: Strength::from_ratio(best.quote.net_profit, self.config.min_profit),
            details: SignalDetails::DeepArbitrage {
                direction: best.direction,
                yes_token_id: yes_token.to_string(),
                no_token_id: no_token.to_string(),
                effective_yes: best.yes.price,
                effective_no: best.no.price,
                yes_via_mirror: best.yes.via_mirror,
                no_via_mirror: best.no.via_mirror,
                naive_total: best.naive_total,
                depth: best.yes.depth.min(best.no.depth),
                quote: best.quote,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketListing, MarketMeta, Outcome, Venue};
    use crate::normalizer::EventPayload;
    use crate::orderbook::PriceLevel;
    use crate::store::{MarketStateStore, StoreConfig};
    use rust_decimal_macros::dec;

    const NOW: i64 = 1_700_000_000_000;

    fn book(bid: Decimal, ask: Decimal) -> OrderBookSnapshot {
        OrderBookSnapshot::new(
            vec![PriceLevel::new(bid, dec!(1000))],
            vec![PriceLevel::new(ask, dec!(1000))],
            NOW - 1_000,
        )
    }

    fn book_event(token: &str, outcome: Outcome, book: OrderBookSnapshot) -> NormalizedEvent {
        NormalizedEvent {
            venue: Venue::Polymarket,
            market_id: "M".to_string(),
            token_id: Some(token.to_string()),
            outcome,
            timestamp_ms: book.timestamp_ms,
            meta: MarketMeta::default(),
            payload: EventPayload::Book(book),
        }
    }

    fn store_with(yes: OrderBookSnapshot, no: OrderBookSnapshot) -> (MarketStateStore, NormalizedEvent) {
        let mut store = MarketStateStore::new(StoreConfig::default());
        let mut listing = MarketListing::new(Venue::Polymarket, "M");
        listing.yes_token_id = Some("yes".to_string());
        listing.no_token_id = Some("no".to_string());
        store.register_listing(&listing, NOW);
        store.apply_event(&book_event("yes", Outcome::Yes, yes));
        let last = book_event("no", Outcome::No, no);
        store.apply_event(&last);
        (store, last)
    }

    fn detect(yes: OrderBookSnapshot, no: OrderBookSnapshot) -> Option<Detection> {
        let (store, event) = store_with(yes, no);
        let ctx = DetectionContext { store: &store, now_ms: NOW };
        DeepArbitrageDetector::new(DeepArbitrageConfig::default()).process(&event, &ctx)
    }

    #[test]
    fn mirror_bids_expose_hidden_buy_arbitrage() {
        // Asks sum to 1.12, but the bids sum to 1.04.
        let detection = detect(book(dec!(0.56), dec!(0.60)), book(dec!(0.48), dec!(0.52)))
            .expect("implied arbitrage expected");

        match detection.details {
            SignalDetails::DeepArbitrage {
                direction,
                effective_yes,
                effective_no,
                yes_via_mirror,
                no_via_mirror,
                naive_total,
                depth,
                quote,
                ..
            } => {
                assert_eq!(direction, ArbDirection::BuyBoth);
                assert_eq!(effective_yes, dec!(0.52));
                assert_eq!(effective_no, dec!(0.44));
                assert!(yes_via_mirror && no_via_mirror);
                assert_eq!(naive_total, Some(dec!(1.12)));
                assert_eq!(depth, dec!(480));
                assert_eq!(quote.net_profit, dec!(0.02656));
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn mirror_asks_expose_hidden_sell_arbitrage() {
        let detection = detect(book(dec!(0.30), dec!(0.40)), book(dec!(0.40), dec!(0.50)))
            .expect("implied arbitrage expected");

        match detection.details {
            SignalDetails::DeepArbitrage { direction, quote, naive_total, .. } => {
                assert_eq!(direction, ArbDirection::SellBoth);
                assert_eq!(naive_total, Some(dec!(0.70)));
                assert_eq!(quote.sum, dec!(1.10));
                assert_eq!(quote.net_profit, dec!(0.0846));
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn consistent_books_emit_nothing() {
        assert!(detect(book(dec!(0.48), dec!(0.50)), book(dec!(0.49), dec!(0.51))).is_none());
    }

    #[test]
    fn stale_book_blocks_signal() {
        let mut old = book(dec!(0.56), dec!(0.60));
        old.timestamp_ms = NOW - 120_000;
        assert!(detect(old, book(dec!(0.48), dec!(0.52))).is_none());
    }
}
