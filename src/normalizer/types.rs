//! Venue-agnostic event shape produced by every adapter.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::market::{MarketListing, MarketMeta, Outcome, Venue};
use crate::orderbook::{OrderBookSnapshot, Side};

/// Where a cached price came from. Higher rank wins over lower rank.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PriceSource {
    /// Last trade print. Lags the live book.
    LastTrade,
    /// Best bid of a book with no asks.
    BestBid,
    /// Best ask of the live book.
    BestAsk,
}

/// Discriminant of [`EventPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    /// Price tick.
    Price,
    /// Order book snapshot.
    Book,
    /// Trade print.
    Trade,
    /// Market metadata.
    MarketMeta,
}

/// Kind-specific data of a [`NormalizedEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// Price tick with its extraction source.
    Price {
        /// Extracted price.
        price: Decimal,
        /// Which book/trade field produced it.
        source: PriceSource,
    },
    /// Full book replacement.
    Book(OrderBookSnapshot),
    /// Single trade print.
    Trade {
        /// Execution price.
        price: Decimal,
        /// Executed shares.
        size: Decimal,
        /// Aggressor side, when known.
        side: Option<Side>,
        /// Trader address, when the venue exposes it.
        trader: Option<String>,
    },
    /// Listing row.
    MarketMeta(MarketListing),
}

/// One normalized market event. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    /// Source venue.
    pub venue: Venue,
    /// Market identifier.
    pub market_id: String,
    /// Token identifier, absent for market-level events.
    pub token_id: Option<String>,
    /// Outcome leg when the wire message states it.
    pub outcome: Outcome,
    /// Unix milliseconds.
    pub timestamp_ms: i64,
    /// Descriptive metadata.
    pub meta: MarketMeta,
    /// Kind-specific data.
    pub payload: EventPayload,
}

impl NormalizedEvent {
    /// Event discriminant.
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::Price { .. } => EventKind::Price,
            EventPayload::Book(_) => EventKind::Book,
            EventPayload::Trade { .. } => EventKind::Trade,
            EventPayload::MarketMeta(_) => EventKind::MarketMeta,
        }
    }

    /// Price carried by the event, using book > trade precedence.
    pub fn price(&self) -> Option<Decimal> {
        match &self.payload {
            EventPayload::Price { price, .. } | EventPayload::Trade { price, .. } => Some(*price),
            EventPayload::Book(book) => book.best_ask().or_else(|| book.best_bid()),
            EventPayload::MarketMeta(listing) => listing.last_price,
        }
    }

    /// Size carried by trade events.
    pub fn size(&self) -> Option<Decimal> {
        match &self.payload {
            EventPayload::Trade { size, .. } => Some(*size),
            _ => None,
        }
    }

    /// Side carried by trade events.
    pub fn side(&self) -> Option<Side> {
        match &self.payload {
            EventPayload::Trade { side, .. } => *side,
            _ => None,
        }
    }

    /// Wrap a listing as a `market_meta` event.
    pub fn from_listing(listing: MarketListing, timestamp_ms: i64) -> Self {
        Self {
            venue: listing.venue,
            market_id: listing.market_id.clone(),
            token_id: None,
            outcome: Outcome::Unknown,
            timestamp_ms,
            meta: listing.meta.clone(),
            payload: EventPayload::MarketMeta(listing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::PriceLevel;
    use rust_decimal_macros::dec;

    fn event(payload: EventPayload) -> NormalizedEvent {
        NormalizedEvent {
            venue: Venue::Polymarket,
            market_id: "m".to_string(),
            token_id: Some("t".to_string()),
            outcome: Outcome::Unknown,
            timestamp_ms: 0,
            meta: MarketMeta::default(),
            payload,
        }
    }

    #[test]
    fn price_source_ranking() {
        assert!(PriceSource::BestAsk > PriceSource::BestBid);
        assert!(PriceSource::BestBid > PriceSource::LastTrade);
    }

    #[test]
    fn book_price_prefers_best_ask() {
        let book = OrderBookSnapshot::new(
            vec![PriceLevel::new(dec!(0.40), dec!(10))],
            vec![PriceLevel::new(dec!(0.42), dec!(10))],
            0,
        );
        let ev = event(EventPayload::Book(book));
        assert_eq!(ev.kind(), EventKind::Book);
        assert_eq!(ev.price(), Some(dec!(0.42)));

        let bids_only = OrderBookSnapshot::new(vec![PriceLevel::new(dec!(0.40), dec!(10))], vec![], 0);
        assert_eq!(event(EventPayload::Book(bids_only)).price(), Some(dec!(0.40)));
    }

    #[test]
    fn trade_accessors() {
        let ev = event(EventPayload::Trade {
            price: dec!(0.5),
            size: dec!(20),
            side: Some(Side::Bid),
            trader: None,
        });
        assert_eq!(ev.kind(), EventKind::Trade);
        assert_eq!(ev.size(), Some(dec!(20)));
        assert_eq!(ev.side(), Some(Side::Bid));
    }
}
