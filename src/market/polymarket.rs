//! Polymarket REST sources: Gamma market listings, the data API leaderboard
//! and per-trader positions.

use std::time::Instant;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::client::{paginate, rfc3339_ms, string_list, ListingPage, ListingSource, RestClient, ScanConfig};
use super::types::{
    ListingScan, MarketListing, MarketMeta, Outcome, PositionSnapshot, RankedTrader, TraderPosition,
    Venue,
};
use crate::error::ListingError;
use crate::metrics;
use crate::normalizer::{decimal_field, string_field};

/// Polymarket listing, leaderboard and position client.
#[derive(Debug, Clone)]
pub struct PolymarketSource {
    client: RestClient,
    config: ScanConfig,
}

impl PolymarketSource {
    /// Create a source from scan parameters.
    pub fn new(config: ScanConfig) -> Result<Self, ListingError> {
        let client = RestClient::new(&config, &[])?;
        Ok(Self { client, config })
    }

    /// Fetch one Gamma page. The cursor is the row offset.
    async fn fetch_page(&self, cursor: Option<String>) -> Result<ListingPage, ListingError> {
        let offset: usize = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| ListingError::Parse(format!("bad offset cursor {c}")))?,
            None => 0,
        };
        let limit = self.config.page_size;
        let query = [
            ("active", "true".to_string()),
            ("closed", "false".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("order", "volume24hr".to_string()),
            ("ascending", "false".to_string()),
        ];
        let body = self
            .client
            .get_json(&self.config.polymarket_gamma_url, "markets", &query)
            .await?;
        let rows = body
            .as_array()
            .ok_or_else(|| ListingError::Parse("gamma markets: expected an array".to_string()))?;

        let listings: Vec<MarketListing> = rows.iter().filter_map(parse_gamma_market).collect();
        if listings.len() < rows.len() {
            debug!(skipped = rows.len() - listings.len(), "Skipped unparseable Gamma rows");
        }
        let next = (rows.len() >= limit).then(|| (offset + rows.len()).to_string());
        Ok(ListingPage { listings, next })
    }

    /// Top traders by PnL.
    #[instrument(skip(self))]
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<RankedTrader>, ListingError> {
        let started = Instant::now();
        let query = [
            ("timePeriod", "month".to_string()),
            ("orderBy", "PNL".to_string()),
            ("limit", limit.to_string()),
        ];
        let result = self
            .client
            .get_json(&self.config.polymarket_data_url, "v1/leaderboard", &query)
            .await;
        metrics::record_scan_duration(started, "leaderboard");

        let body = result.inspect_err(|e| {
            warn!(error = %e, "Leaderboard fetch failed");
            metrics::inc_scan_failures("leaderboard");
        })?;
        let rows = body
            .as_array()
            .ok_or_else(|| ListingError::Parse("leaderboard: expected an array".to_string()))?;

        let mut traders: Vec<RankedTrader> = rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| parse_leaderboard_row(row, i as u32 + 1))
            .collect();
        traders.sort_by_key(|t| t.rank);
        traders.truncate(limit);
        Ok(traders)
    }

    /// Current open positions of one trader.
    #[instrument(skip(self, trader), fields(address = %trader.address))]
    pub async fn positions(
        &self,
        trader: &RankedTrader,
        now_ms: i64,
    ) -> Result<PositionSnapshot, ListingError> {
        let started = Instant::now();
        let query = [
            ("user", trader.address.clone()),
            ("sizeThreshold", "1".to_string()),
            ("limit", "500".to_string()),
        ];
        let result = self
            .client
            .get_json(&self.config.polymarket_data_url, "positions", &query)
            .await;
        metrics::record_scan_duration(started, "positions");

        let body = result.inspect_err(|e| {
            warn!(error = %e, "Position fetch failed");
            metrics::inc_scan_failures("positions");
        })?;
        let rows = body
            .as_array()
            .ok_or_else(|| ListingError::Parse("positions: expected an array".to_string()))?;

        Ok(PositionSnapshot {
            trader: trader.clone(),
            positions: rows.iter().filter_map(parse_position).collect(),
            fetched_ms: now_ms,
        })
    }
}

impl ListingSource for PolymarketSource {
    fn venue(&self) -> Venue {
        Venue::Polymarket
    }

    async fn fetch_listings(&self) -> ListingScan {
        paginate(Venue::Polymarket, &self.config, |cursor| self.fetch_page(cursor)).await
    }
}

/// Parse one Gamma `/markets` row.
pub fn parse_gamma_market(row: &Value) -> Option<MarketListing> {
    let market_id = string_field(row, "conditionId")?;
    let mut listing = MarketListing::new(Venue::Polymarket, market_id);

    listing.meta = MarketMeta {
        slug: string_field(row, "slug"),
        event_slug: row
            .get("events")
            .and_then(Value::as_array)
            .and_then(|events| events.first())
            .and_then(|event| string_field(event, "slug")),
        title: string_field(row, "question"),
    };

    let tokens = string_list(row.get("clobTokenIds"));
    let outcomes = string_list(row.get("outcomes"));
    for (i, token) in tokens.iter().enumerate() {
        let outcome = match outcomes.get(i).map(|label| Outcome::from_label(label)) {
            Some(Outcome::Unknown) | None if i == 0 => Outcome::Yes,
            Some(Outcome::Unknown) | None if i == 1 => Outcome::No,
            Some(outcome) => outcome,
            None => Outcome::Unknown,
        };
        match outcome {
            Outcome::Yes if listing.yes_token_id.is_none() => listing.yes_token_id = Some(token.clone()),
            Outcome::No if listing.no_token_id.is_none() => listing.no_token_id = Some(token.clone()),
            _ => {}
        }
    }

    listing.volume_24h = decimal_field(row, "volume24hr").unwrap_or_default();
    listing.liquidity = decimal_field(row, "liquidityNum")
        .or_else(|| decimal_field(row, "liquidity"))
        .unwrap_or_default();
    listing.last_price = decimal_field(row, "lastTradePrice")
        .filter(|p| *p > Decimal::ZERO)
        .or_else(|| {
            string_list(row.get("outcomePrices"))
                .first()
                .and_then(|p| p.parse().ok())
        });
    listing.end_time_ms = row.get("endDate").and_then(Value::as_str).and_then(rfc3339_ms);
    let active = row.get("active").and_then(Value::as_bool).unwrap_or(true);
    let closed = row.get("closed").and_then(Value::as_bool).unwrap_or(false);
    listing.closed = closed || !active;
    Some(listing)
}

/// Parse one leaderboard row, falling back to list position for the rank.
pub fn parse_leaderboard_row(row: &Value, position: u32) -> Option<RankedTrader> {
    let address = string_field(row, "proxyWallet")?.to_lowercase();
    let rank = string_field(row, "rank")
        .and_then(|r| r.parse().ok())
        .unwrap_or(position);
    Some(RankedTrader {
        address,
        rank,
        name: string_field(row, "userName"),
        pnl: decimal_field(row, "pnl").unwrap_or_default(),
    })
}

/// Parse one `/positions` row.
pub fn parse_position(row: &Value) -> Option<TraderPosition> {
    Some(TraderPosition {
        market_id: string_field(row, "conditionId")?,
        token_id: string_field(row, "asset")?,
        outcome: row
            .get("outcome")
            .and_then(Value::as_str)
            .map(Outcome::from_label)
            .unwrap_or_default(),
        size: decimal_field(row, "size")?,
        value: decimal_field(row, "currentValue").unwrap_or_default(),
        avg_price: decimal_field(row, "avgPrice").unwrap_or_default(),
        meta: MarketMeta {
            slug: string_field(row, "slug"),
            event_slug: string_field(row, "eventSlug"),
            title: string_field(row, "title"),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_gamma_row() {
        let row = json!({
            "conditionId": "0xcond",
            "slug": "will-it-rain",
            "question": "Will it rain?",
            "events": [{"slug": "weather"}],
            "clobTokenIds": "[\"111\", \"222\"]",
            "outcomes": "[\"No\", \"Yes\"]",
            "volume24hr": 12500.5,
            "liquidityNum": 3000,
            "lastTradePrice": 0.42,
            "endDate": "2023-11-14T22:13:20Z",
            "active": true,
            "closed": false
        });

        let listing = parse_gamma_market(&row).unwrap();
        assert_eq!(listing.market_id, "0xcond");
        assert_eq!(listing.yes_token_id.as_deref(), Some("222"));
        assert_eq!(listing.no_token_id.as_deref(), Some("111"));
        assert_eq!(listing.meta.event_slug.as_deref(), Some("weather"));
        assert_eq!(listing.volume_24h, dec!(12500.5));
        assert_eq!(listing.liquidity, dec!(3000));
        assert_eq!(listing.last_price, Some(dec!(0.42)));
        assert_eq!(listing.end_time_ms, Some(1_700_000_000_000));
        assert!(!listing.closed);
    }

    #[test]
    fn gamma_row_falls_back_to_positional_tokens() {
        let row = json!({
            "conditionId": "0xcond",
            "clobTokenIds": ["a", "b"],
            "outcomes": ["Trump", "Harris"],
            "outcomePrices": "[\"0.61\", \"0.39\"]",
            "active": false
        });

        let listing = parse_gamma_market(&row).unwrap();
        assert_eq!(listing.yes_token_id.as_deref(), Some("a"));
        assert_eq!(listing.no_token_id.as_deref(), Some("b"));
        assert_eq!(listing.last_price, Some(dec!(0.61)));
        assert!(listing.closed);
    }

    #[test]
    fn gamma_row_without_condition_is_skipped() {
        assert!(parse_gamma_market(&json!({"slug": "x"})).is_none());
    }

    #[test]
    fn parses_leaderboard_and_positions() {
        let trader = parse_leaderboard_row(
            &json!({"rank": "2", "proxyWallet": "0xABC", "userName": "whale", "pnl": 1500.25}),
            7,
        )
        .unwrap();
        assert_eq!(trader.address, "0xabc");
        assert_eq!(trader.rank, 2);
        assert_eq!(trader.pnl, dec!(1500.25));

        let unranked = parse_leaderboard_row(&json!({"proxyWallet": "0xdef"}), 7).unwrap();
        assert_eq!(unranked.rank, 7);

        let position = parse_position(&json!({
            "asset": "111",
            "conditionId": "0xcond",
            "size": "2500",
            "avgPrice": 0.4,
            "currentValue": 1250,
            "outcome": "Yes",
            "title": "Will it rain?",
            "slug": "will-it-rain",
            "eventSlug": "weather"
        }))
        .unwrap();
        assert_eq!(position.outcome, Outcome::Yes);
        assert_eq!(position.size, dec!(2500));
        assert_eq!(position.value, dec!(1250));
        assert_eq!(position.meta.event_slug.as_deref(), Some("weather"));
    }
}
