//! Event normalizer: one adapter per venue, one output shape.
//!
//! Adapters never fail. Malformed or partial messages produce no events and
//! are counted, so a single detector pipeline can serve every venue.

pub mod kalshi;
pub mod opinion;
pub mod polymarket;
pub mod types;

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::market::Venue;
use crate::metrics;

pub use kalshi::KalshiNormalizer;
pub use types::{EventKind, EventPayload, NormalizedEvent, PriceSource};

/// Stateful per-connection normalizer.
///
/// Polymarket and Opinion adapters are pure functions; Kalshi keeps a price
/// ladder per ticker so incremental deltas still yield whole books.
#[derive(Debug)]
pub enum VenueNormalizer {
    /// Polymarket market channel.
    Polymarket,
    /// Kalshi v2 channels.
    Kalshi(KalshiNormalizer),
    /// Opinion channels.
    Opinion,
}

impl VenueNormalizer {
    /// Create the normalizer for a venue.
    pub fn for_venue(venue: Venue) -> Self {
        match venue {
            Venue::Polymarket => Self::Polymarket,
            Venue::Kalshi => Self::Kalshi(KalshiNormalizer::default()),
            Venue::Opinion => Self::Opinion,
        }
    }

    /// Venue this normalizer serves.
    pub fn venue(&self) -> Venue {
        match self {
            Self::Polymarket => Venue::Polymarket,
            Self::Kalshi(_) => Venue::Kalshi,
            Self::Opinion => Venue::Opinion,
        }
    }

    /// Normalize one text frame. Frames that are not JSON produce nothing.
    pub fn normalize_frame(&mut self, text: &str, received_ms: i64) -> Vec<NormalizedEvent> {
        let venue = self.venue();
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            metrics::inc_normalizer_dropped(venue);
            return Vec::new();
        };

        let messages = match value {
            Value::Array(items) => items,
            other => vec![other],
        };

        let mut events = Vec::new();
        for message in &messages {
            let produced = match self {
                Self::Polymarket => polymarket::normalize(message, received_ms),
                Self::Kalshi(state) => state.normalize(message, received_ms),
                Self::Opinion => opinion::normalize(message, received_ms),
            };
            if produced.is_empty() {
                metrics::inc_normalizer_dropped(venue);
            }
            events.extend(produced);
        }
        events
    }
}

/// Read a decimal that venues send either as a JSON string or a number.
pub(crate) fn decimal_field(value: &Value, key: &str) -> Option<Decimal> {
    as_decimal(value.get(key)?)
}

/// Convert a JSON scalar into a decimal.
pub(crate) fn as_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                Decimal::from_str(&n.to_string()).ok()
            }
        }
        _ => None,
    }
}

/// Read a string or numeric id as a string.
pub(crate) fn string_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Read a timestamp in seconds or milliseconds, string or number.
///
/// Values below 10^12 are taken as seconds.
pub(crate) fn timestamp_field(value: &Value, key: &str) -> Option<i64> {
    let raw = match value.get(key)? {
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
        _ => return None,
    };
    if raw <= 0 {
        return None;
    }
    Some(if raw < 1_000_000_000_000 { raw * 1000 } else { raw })
}

/// A probability price must lie strictly inside (0, 1].
pub(crate) fn valid_price(price: Decimal) -> bool {
    price > Decimal::ZERO && price <= Decimal::ONE
}
