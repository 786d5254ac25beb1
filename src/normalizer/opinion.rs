//! Opinion exchange adapter.
//!
//! Messages are flat objects tagged by `channel` and keyed by `marketId` and
//! `tokenId`; the outcome label travels with every message.

use rust_decimal::Decimal;
use serde_json::Value;

use super::types::{EventPayload, NormalizedEvent, PriceSource};
use super::{as_decimal, decimal_field, string_field, timestamp_field, valid_price};
use crate::market::{MarketMeta, Outcome, Venue};
use crate::orderbook::{OrderBookSnapshot, PriceLevel, Side};

/// Normalize one Opinion message object.
pub fn normalize(message: &Value, received_ms: i64) -> Vec<NormalizedEvent> {
    let Some(channel) = message.get("channel").and_then(Value::as_str) else {
        return Vec::new();
    };
    let (Some(market_id), Some(token_id)) = (
        string_field(message, "marketId"),
        string_field(message, "tokenId"),
    ) else {
        return Vec::new();
    };
    let timestamp_ms = timestamp_field(message, "ts")
        .or_else(|| timestamp_field(message, "timestamp"))
        .unwrap_or(received_ms);

    let payload = match channel {
        "orderbook" | "market.depth" => parse_book(message, timestamp_ms),
        "price" | "market.price" => parse_price(message),
        "trade" | "market.trade" => parse_trade(message),
        _ => None,
    };

    payload
        .map(|payload| NormalizedEvent {
            venue: Venue::Opinion,
            market_id,
            token_id: Some(token_id),
            outcome: message
                .get("outcome")
                .and_then(Value::as_str)
                .map(Outcome::from_label)
                .unwrap_or_default(),
            timestamp_ms,
            meta: MarketMeta {
                slug: string_field(message, "slug"),
                event_slug: None,
                title: string_field(message, "marketTitle"),
            },
            payload,
        })
        .into_iter()
        .collect()
}

/// Parse `[[price, size], ...]`; any malformed pair rejects the side.
fn parse_pairs(levels: Option<&Value>) -> Option<Vec<PriceLevel>> {
    let Some(levels) = levels else {
        return Some(Vec::new());
    };
    levels
        .as_array()?
        .iter()
        .map(|pair| {
            let pair = pair.as_array()?;
            Some(PriceLevel::new(as_decimal(pair.first()?)?, as_decimal(pair.get(1)?)?))
        })
        .collect()
}

fn parse_book(message: &Value, timestamp_ms: i64) -> Option<EventPayload> {
    let bids = parse_pairs(message.get("bids"))?;
    let asks = parse_pairs(message.get("asks"))?;
    if bids.is_empty() && asks.is_empty() {
        return None;
    }
    Some(EventPayload::Book(OrderBookSnapshot::new(bids, asks, timestamp_ms)))
}

fn parse_price(message: &Value) -> Option<EventPayload> {
    if let Some(ask) = decimal_field(message, "bestAsk").filter(|p| valid_price(*p)) {
        return Some(EventPayload::Price {
            price: ask,
            source: PriceSource::BestAsk,
        });
    }
    if let Some(bid) = decimal_field(message, "bestBid").filter(|p| valid_price(*p)) {
        return Some(EventPayload::Price {
            price: bid,
            source: PriceSource::BestBid,
        });
    }
    decimal_field(message, "price")
        .filter(|p| valid_price(*p))
        .map(|price| EventPayload::Price {
            price,
            source: PriceSource::LastTrade,
        })
}

fn parse_trade(message: &Value) -> Option<EventPayload> {
    let price = decimal_field(message, "price").filter(|p| valid_price(*p))?;
    let size = decimal_field(message, "shares")
        .or_else(|| decimal_field(message, "size"))
        .filter(|s| *s > Decimal::ZERO)?;
    Some(EventPayload::Trade {
        price,
        size,
        side: message.get("side").and_then(Value::as_str).and_then(Side::from_label),
        trader: string_field(message, "user"),
    })
}
