//! Polymarket CLOB market-channel adapter.
//!
//! Handles `book`, `price_change` and `last_trade_price` messages. The market
//! id is the condition id; outcomes are resolved later from listings.

use rust_decimal::Decimal;
use serde_json::Value;

use super::types::{EventPayload, NormalizedEvent, PriceSource};
use super::{decimal_field, string_field, timestamp_field, valid_price};
use crate::market::{MarketMeta, Outcome, Venue};
use crate::orderbook::{OrderBookSnapshot, PriceLevel, Side};

/// Normalize one Polymarket message object.
pub fn normalize(message: &Value, received_ms: i64) -> Vec<NormalizedEvent> {
    let Some(event_type) = message.get("event_type").and_then(Value::as_str) else {
        return Vec::new();
    };
    let timestamp_ms = timestamp_field(message, "timestamp").unwrap_or(received_ms);

    match event_type {
        "book" => normalize_book(message, timestamp_ms).into_iter().collect(),
        "price_change" => normalize_price_change(message, timestamp_ms),
        "last_trade_price" => normalize_trade(message, timestamp_ms).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn base_event(
    market_id: String,
    token_id: String,
    timestamp_ms: i64,
    payload: EventPayload,
) -> NormalizedEvent {
    NormalizedEvent {
        venue: Venue::Polymarket,
        market_id,
        token_id: Some(token_id),
        outcome: Outcome::Unknown,
        timestamp_ms,
        meta: MarketMeta::default(),
        payload,
    }
}

fn normalize_book(message: &Value, timestamp_ms: i64) -> Option<NormalizedEvent> {
    let token_id = string_field(message, "asset_id")?;
    let market_id = string_field(message, "market")?;

    let bids = parse_levels(message.get("bids"))?;
    let asks = parse_levels(message.get("asks"))?;
    if bids.is_empty() && asks.is_empty() {
        return None;
    }

    let book = OrderBookSnapshot::new(bids, asks, timestamp_ms);
    Some(base_event(market_id, token_id, timestamp_ms, EventPayload::Book(book)))
}

/// Parse `[{price, size}, ...]`. Any malformed level rejects the whole side.
fn parse_levels(levels: Option<&Value>) -> Option<Vec<PriceLevel>> {
    let Some(levels) = levels else {
        return Some(Vec::new());
    };
    levels
        .as_array()?
        .iter()
        .map(|level| {
            let price = decimal_field(level, "price")?;
            let size = decimal_field(level, "size")?;
            (price >= Decimal::ZERO && size >= Decimal::ZERO).then(|| PriceLevel::new(price, size))
        })
        .collect()
}

fn normalize_price_change(message: &Value, timestamp_ms: i64) -> Vec<NormalizedEvent> {
    let Some(market_id) = string_field(message, "market") else {
        return Vec::new();
    };
    let Some(changes) = message.get("price_changes").and_then(Value::as_array) else {
        return Vec::new();
    };

    changes
        .iter()
        .filter_map(|change| {
            let token_id = string_field(change, "asset_id")?;
            let (price, source) = best_price(change)?;
            Some(base_event(
                market_id.clone(),
                token_id,
                timestamp_ms,
                EventPayload::Price { price, source },
            ))
        })
        .collect()
}

/// Best ask first, then best bid. The changed level's own price is not a
/// top-of-book quote and is never used.
fn best_price(change: &Value) -> Option<(Decimal, PriceSource)> {
    if let Some(ask) = decimal_field(change, "best_ask").filter(|p| valid_price(*p)) {
        return Some((ask, PriceSource::BestAsk));
    }
    decimal_field(change, "best_bid")
        .filter(|p| valid_price(*p))
        .map(|bid| (bid, PriceSource::BestBid))
}

fn normalize_trade(message: &Value, timestamp_ms: i64) -> Option<NormalizedEvent> {
    let token_id = string_field(message, "asset_id")?;
    let market_id = string_field(message, "market")?;
    let price = decimal_field(message, "price").filter(|p| valid_price(*p))?;
    let size = decimal_field(message, "size").filter(|s| *s > Decimal::ZERO)?;
    let side = message
        .get("side")
        .and_then(Value::as_str)
        .and_then(Side::from_label);

    Some(base_event(
        market_id,
        token_id,
        timestamp_ms,
        EventPayload::Trade {
            price,
            size,
            side,
            trader: None,
        },
    ))
}
