//! Kalshi v2 websocket adapter.
//!
//! Kalshi books carry only bids for each side: a YES bid at `p` is a NO ask at
//! `1 - p`. Each ticker is split into two synthetic tokens, `TICKER:yes` and
//! `TICKER:no`, so the rest of the engine sees ordinary per-outcome books.

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use super::types::{EventPayload, NormalizedEvent, PriceSource};
use super::{as_decimal, decimal_field, string_field, timestamp_field, valid_price};
use crate::market::{MarketMeta, Outcome, Venue};
use crate::orderbook::{OrderBookSnapshot, PriceLadder, PriceLevel, Side};
use crate::store::InsertionOrderCache;

/// Upper bound on tickers with a maintained ladder. The oldest ticker is
/// dropped first; its next snapshot starts it again.
const MAX_TRACKED_TICKERS: usize = 10_000;

/// Token id for one leg of a Kalshi ticker.
pub fn token_id(ticker: &str, outcome: Outcome) -> String {
    match outcome {
        Outcome::No => format!("{ticker}:no"),
        _ => format!("{ticker}:yes"),
    }
}

fn cents(value: Decimal) -> Decimal {
    value / Decimal::ONE_HUNDRED
}

#[derive(Debug, Default, Clone)]
struct TickerBook {
    yes_bids: PriceLadder,
    no_bids: PriceLadder,
}

impl TickerBook {
    fn ladder_mut(&mut self, outcome: Outcome) -> &mut PriceLadder {
        match outcome {
            Outcome::No => &mut self.no_bids,
            _ => &mut self.yes_bids,
        }
    }

    /// Book for one leg: its own bids, asks mirrored from the other leg's bids.
    fn snapshot(&self, outcome: Outcome, timestamp_ms: i64) -> OrderBookSnapshot {
        let (own, other) = match outcome {
            Outcome::No => (&self.no_bids, &self.yes_bids),
            _ => (&self.yes_bids, &self.no_bids),
        };
        let bids = own.descending();
        let asks = other
            .descending()
            .into_iter()
            .map(|level| PriceLevel::new(Decimal::ONE - level.price, level.size))
            .collect();
        OrderBookSnapshot::new(bids, asks, timestamp_ms)
    }
}

/// Stateful Kalshi normalizer holding one ladder pair per ticker.
#[derive(Debug)]
pub struct KalshiNormalizer {
    books: InsertionOrderCache<String, TickerBook>,
}

impl Default for KalshiNormalizer {
    fn default() -> Self {
        Self::with_capacity(MAX_TRACKED_TICKERS)
    }
}

impl KalshiNormalizer {
    /// Normalizer keeping ladders for at most `capacity` tickers.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            books: InsertionOrderCache::new(capacity),
        }
    }

    /// Number of tickers with a live ladder.
    pub fn tracked_tickers(&self) -> usize {
        self.books.len()
    }

    /// Normalize one Kalshi message object.
    pub fn normalize(&mut self, message: &Value, received_ms: i64) -> Vec<NormalizedEvent> {
        let Some(kind) = message.get("type").and_then(Value::as_str) else {
            return Vec::new();
        };
        let Some(body) = message.get("msg") else {
            return Vec::new();
        };
        let Some(ticker) = string_field(body, "market_ticker") else {
            return Vec::new();
        };
        let timestamp_ms = timestamp_field(body, "ts").unwrap_or(received_ms);

        match kind {
            "orderbook_snapshot" => self.apply_snapshot(&ticker, body, timestamp_ms),
            "orderbook_delta" => self.apply_delta(&ticker, body, timestamp_ms),
            "ticker" | "ticker_v2" => normalize_ticker(&ticker, body, timestamp_ms),
            "trade" => normalize_trade(&ticker, body, timestamp_ms).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn apply_snapshot(&mut self, ticker: &str, body: &Value, timestamp_ms: i64) -> Vec<NormalizedEvent> {
        let (Some(yes), Some(no)) = (parse_ladder(body.get("yes")), parse_ladder(body.get("no"))) else {
            return Vec::new();
        };

        let mut book = TickerBook::default();
        book.yes_bids.apply_snapshot(yes);
        book.no_bids.apply_snapshot(no);
        let events = book_events(ticker, &book, timestamp_ms);

        for (evicted, _) in self.books.insert(ticker.to_string(), book) {
            debug!(ticker = %evicted, "Dropped oldest Kalshi ladder");
        }
        events
    }

    fn apply_delta(&mut self, ticker: &str, body: &Value, timestamp_ms: i64) -> Vec<NormalizedEvent> {
        // Deltas before a snapshot cannot be applied.
        let Some(book) = self.books.get_mut(ticker) else {
            return Vec::new();
        };
        let (Some(price), Some(delta)) = (decimal_field(body, "price"), decimal_field(body, "delta")) else {
            return Vec::new();
        };
        let outcome = body
            .get("side")
            .and_then(Value::as_str)
            .map(Outcome::from_label)
            .unwrap_or_default();
        if outcome == Outcome::Unknown {
            return Vec::new();
        }

        book.ladder_mut(outcome).apply_delta(cents(price), delta);
        book_events(ticker, book, timestamp_ms)
    }
}

fn book_events(ticker: &str, book: &TickerBook, timestamp_ms: i64) -> Vec<NormalizedEvent> {
    [Outcome::Yes, Outcome::No]
        .into_iter()
        .map(|outcome| {
            leg_event(
                ticker,
                outcome,
                timestamp_ms,
                EventPayload::Book(book.snapshot(outcome, timestamp_ms)),
            )
        })
        .collect()
}

fn leg_event(ticker: &str, outcome: Outcome, timestamp_ms: i64, payload: EventPayload) -> NormalizedEvent {
    NormalizedEvent {
        venue: Venue::Kalshi,
        market_id: ticker.to_string(),
        token_id: Some(token_id(ticker, outcome)),
        outcome,
        timestamp_ms,
        meta: MarketMeta {
            slug: Some(ticker.to_string()),
            ..Default::default()
        },
        payload,
    }
}

/// Parse `[[price_cents, size], ...]`. A missing side is an empty side.
fn parse_ladder(levels: Option<&Value>) -> Option<Vec<(Decimal, Decimal)>> {
    let Some(levels) = levels else {
        return Some(Vec::new());
    };
    levels
        .as_array()?
        .iter()
        .map(|level| {
            let pair = level.as_array()?;
            let price = as_decimal(pair.first()?)?;
            let size = as_decimal(pair.get(1)?)?;
            Some((cents(price), size))
        })
        .collect()
}

fn normalize_ticker(ticker: &str, body: &Value, timestamp_ms: i64) -> Vec<NormalizedEvent> {
    let yes_bid = decimal_field(body, "yes_bid").map(cents).filter(|p| valid_price(*p));
    let yes_ask = decimal_field(body, "yes_ask").map(cents).filter(|p| valid_price(*p));

    let mut events = Vec::with_capacity(2);

    // YES leg: its own ask, else its own bid.
    let yes_quote = yes_ask
        .map(|p| (p, PriceSource::BestAsk))
        .or_else(|| yes_bid.map(|p| (p, PriceSource::BestBid)));
    // NO leg: a YES bid is a NO ask; a YES ask is a NO bid.
    let no_quote = yes_bid
        .map(|p| (Decimal::ONE - p, PriceSource::BestAsk))
        .or_else(|| yes_ask.map(|p| (Decimal::ONE - p, PriceSource::BestBid)));

    for (outcome, quote) in [(Outcome::Yes, yes_quote), (Outcome::No, no_quote)] {
        if let Some((price, source)) = quote.filter(|(p, _)| valid_price(*p)) {
            events.push(leg_event(ticker, outcome, timestamp_ms, EventPayload::Price { price, source }));
        }
    }
    events
}

fn normalize_trade(ticker: &str, body: &Value, timestamp_ms: i64) -> Option<NormalizedEvent> {
    let outcome = Outcome::from_label(body.get("taker_side")?.as_str()?);
    let price_key = match outcome {
        Outcome::Yes => "yes_price",
        Outcome::No => "no_price",
        Outcome::Unknown => return None,
    };
    let price = decimal_field(body, price_key).map(cents).filter(|p| valid_price(*p))?;
    let size = decimal_field(body, "count").filter(|s| *s > Decimal::ZERO)?;

    Some(leg_event(
        ticker,
        outcome,
        timestamp_ms,
        EventPayload::Trade {
            price,
            size,
            side: Some(Side::Bid),
            trader: None,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn snapshot_msg() -> Value {
        json!({
            "type": "orderbook_snapshot",
            "sid": 1,
            "seq": 1,
            "msg": {
                "market_ticker": "FED-T4",
                "yes": [[40, 100], [38, 50]],
                "no": [[55, 200]]
            }
        })
    }

    fn book_of(event: &NormalizedEvent) -> &OrderBookSnapshot {
        match &event.payload {
            EventPayload::Book(book) => book,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn snapshot_yields_mirrored_books_for_both_legs() {
        let mut normalizer = KalshiNormalizer::default();
        let events = normalizer.normalize(&snapshot_msg(), 1_000);

        assert_eq!(events.len(), 2);
        let yes = &events[0];
        assert_eq!(yes.token_id.as_deref(), Some("FED-T4:yes"));
        assert_eq!(yes.outcome, Outcome::Yes);
        assert_eq!(book_of(yes).best_bid(), Some(dec!(0.40)));
        // NO bid 0.55 -> YES ask 0.45
        assert_eq!(book_of(yes).best_ask(), Some(dec!(0.45)));

        let no = &events[1];
        assert_eq!(no.outcome, Outcome::No);
        assert_eq!(book_of(no).best_bid(), Some(dec!(0.55)));
        // YES bid 0.40 -> NO ask 0.60
        assert_eq!(book_of(no).best_ask(), Some(dec!(0.60)));
    }

    #[test]
    fn delta_before_snapshot_is_dropped() {
        let mut normalizer = KalshiNormalizer::default();
        let delta = json!({"type": "orderbook_delta", "msg": {"market_ticker": "X", "price": 40, "delta": 10, "side": "yes"}});
        assert!(normalizer.normalize(&delta, 0).is_empty());
    }

    #[test]
    fn delta_updates_ladder() {
        let mut normalizer = KalshiNormalizer::default();
        normalizer.normalize(&snapshot_msg(), 0);

        let delta = json!({"type": "orderbook_delta", "msg": {"market_ticker": "FED-T4", "price": 40, "delta": -100, "side": "yes"}});
        let events = normalizer.normalize(&delta, 5);
        assert_eq!(events.len(), 2);
        assert_eq!(book_of(&events[0]).best_bid(), Some(dec!(0.38)));
        assert_eq!(book_of(&events[1]).best_ask(), Some(dec!(0.62)));
        assert_eq!(normalizer.tracked_tickers(), 1);
    }

    #[test]
    fn full_ladder_map_still_accepts_new_tickers() {
        let mut normalizer = KalshiNormalizer::with_capacity(2);
        for ticker in ["A", "B", "C"] {
            let msg = json!({"type": "orderbook_snapshot", "msg": {"market_ticker": ticker, "yes": [[40, 100]], "no": [[55, 200]]}});
            let events = normalizer.normalize(&msg, 0);
            assert_eq!(events.len(), 2);
            assert_eq!(book_of(&events[0]).best_ask(), Some(dec!(0.45)));
        }
        assert_eq!(normalizer.tracked_tickers(), 2);

        // "A" was dropped; its deltas wait for a fresh snapshot.
        let delta = json!({"type": "orderbook_delta", "msg": {"market_ticker": "A", "price": 40, "delta": 10, "side": "yes"}});
        assert!(normalizer.normalize(&delta, 1).is_empty());
        let delta = json!({"type": "orderbook_delta", "msg": {"market_ticker": "C", "price": 41, "delta": 10, "side": "yes"}});
        assert_eq!(book_of(&normalizer.normalize(&delta, 1)[0]).best_bid(), Some(dec!(0.41)));
    }

    #[test]
    fn ticker_produces_both_leg_prices() {
        let mut normalizer = KalshiNormalizer::default();
        let msg = json!({"type": "ticker", "msg": {"market_ticker": "T", "yes_bid": 45, "yes_ask": 53, "ts": 1_669_149_841}});
        let events = normalizer.normalize(&msg, 0);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload, EventPayload::Price { price: dec!(0.53), source: PriceSource::BestAsk });
        assert_eq!(events[1].payload, EventPayload::Price { price: dec!(0.55), source: PriceSource::BestAsk });
        assert_eq!(events[0].timestamp_ms, 1_669_149_841_000);
    }

    #[test]
    fn trade_maps_taker_side_to_leg() {
        let mut normalizer = KalshiNormalizer::default();
        let msg = json!({"type": "trade", "msg": {"market_ticker": "T", "yes_price": 36, "no_price": 64, "count": 136, "taker_side": "no"}});
        let events = normalizer.normalize(&msg, 0);

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].token_id.as_deref(), Some("T:no"));
        assert_eq!(events[0].price(), Some(dec!(0.64)));
        assert_eq!(events[0].size(), Some(dec!(136)));
    }

    #[test]
    fn message_without_ticker_is_dropped() {
        let mut normalizer = KalshiNormalizer::default();
        assert!(normalizer.normalize(&json!({"type": "ticker", "msg": {}}), 0).is_empty());
        assert!(normalizer.normalize(&json!({"type": "subscribed", "msg": {"sid": 1}}), 0).is_empty());
    }
}
