//! Kalshi market listings (cursor-paged `/markets`).

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use super::client::{paginate, rfc3339_ms, ListingPage, ListingSource, RestClient, ScanConfig};
use super::types::{ListingScan, MarketListing, MarketMeta, Outcome, Venue};
use crate::error::ListingError;
use crate::normalizer::kalshi::token_id;
use crate::normalizer::{decimal_field, string_field};

/// Kalshi caps `limit` at 1000.
const MAX_PAGE_SIZE: usize = 1000;

/// Kalshi listing client.
#[derive(Debug, Clone)]
pub struct KalshiSource {
    client: RestClient,
    config: ScanConfig,
}

impl KalshiSource {
    /// Create a source from scan parameters.
    pub fn new(config: ScanConfig) -> Result<Self, ListingError> {
        let client = RestClient::new(&config, &[])?;
        Ok(Self { client, config })
    }

    async fn fetch_page(&self, cursor: Option<String>) -> Result<ListingPage, ListingError> {
        let mut query = vec![
            ("status", "open".to_string()),
            ("limit", self.config.page_size.min(MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }
        let body = self
            .client
            .get_json(&self.config.kalshi_api_url, "markets", &query)
            .await?;
        parse_markets_page(&body)
    }
}

impl ListingSource for KalshiSource {
    fn venue(&self) -> Venue {
        Venue::Kalshi
    }

    async fn fetch_listings(&self) -> ListingScan {
        paginate(Venue::Kalshi, &self.config, |cursor| self.fetch_page(cursor)).await
    }
}

/// Parse a `/markets` response body into a page.
pub fn parse_markets_page(body: &Value) -> Result<ListingPage, ListingError> {
    let rows = body
        .get("markets")
        .and_then(Value::as_array)
        .ok_or_else(|| ListingError::Parse("kalshi markets: missing markets array".to_string()))?;

    let listings: Vec<MarketListing> = rows.iter().filter_map(parse_market).collect();
    if listings.len() < rows.len() {
        debug!(skipped = rows.len() - listings.len(), "Skipped unparseable Kalshi rows");
    }
    let next = body
        .get("cursor")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    Ok(ListingPage { listings, next })
}

/// Parse one Kalshi market row. Prices and liquidity come in cents unless a
/// `_dollars` variant is present.
pub fn parse_market(row: &Value) -> Option<MarketListing> {
    let ticker = string_field(row, "ticker")?;
    let mut listing = MarketListing::new(Venue::Kalshi, ticker.clone());

    listing.meta = MarketMeta {
        slug: Some(ticker.clone()),
        event_slug: string_field(row, "event_ticker"),
        title: string_field(row, "title"),
    };
    listing.yes_token_id = Some(token_id(&ticker, Outcome::Yes));
    listing.no_token_id = Some(token_id(&ticker, Outcome::No));

    listing.last_price = dollars(row, "last_price").filter(|p| *p > Decimal::ZERO);
    listing.liquidity = dollars(row, "liquidity").unwrap_or_default();
    listing.volume_24h = decimal_field(row, "volume_24h").unwrap_or_default();
    listing.end_time_ms = row.get("close_time").and_then(Value::as_str).and_then(rfc3339_ms);
    listing.closed = !matches!(
        row.get("status").and_then(Value::as_str),
        None | Some("open") | Some("active") | Some("initialized")
    );
    Some(listing)
}

fn dollars(row: &Value, key: &str) -> Option<Decimal> {
    decimal_field(row, &format!("{key}_dollars"))
        .or_else(|| decimal_field(row, key).map(|cents| cents / Decimal::ONE_HUNDRED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_market_page() {
        let body = json!({
            "cursor": "abc",
            "markets": [
                {
                    "ticker": "FED-25DEC-T4.00",
                    "event_ticker": "FED-25DEC",
                    "title": "Fed above 4.00%?",
                    "last_price": 37,
                    "volume_24h": 52000,
                    "liquidity": 1250000,
                    "close_time": "2023-11-14T22:13:20Z",
                    "status": "active"
                },
                {"title": "no ticker"}
            ]
        });

        let page = parse_markets_page(&body).unwrap();
        assert_eq!(page.next.as_deref(), Some("abc"));
        assert_eq!(page.listings.len(), 1);

        let listing = &page.listings[0];
        assert_eq!(listing.market_id, "FED-25DEC-T4.00");
        assert_eq!(listing.yes_token_id.as_deref(), Some("FED-25DEC-T4.00:yes"));
        assert_eq!(listing.no_token_id.as_deref(), Some("FED-25DEC-T4.00:no"));
        assert_eq!(listing.last_price, Some(dec!(0.37)));
        assert_eq!(listing.liquidity, dec!(12500));
        assert_eq!(listing.volume_24h, dec!(52000));
        assert_eq!(listing.end_time_ms, Some(1_700_000_000_000));
        assert!(!listing.closed);
    }

    #[test]
    fn empty_cursor_ends_pagination() {
        let page = parse_markets_page(&json!({"cursor": "", "markets": []})).unwrap();
        assert!(page.next.is_none());
        assert!(parse_markets_page(&json!({"error": "nope"})).is_err());
    }

    #[test]
    fn dollar_fields_win_over_cents() {
        let listing = parse_market(&json!({
            "ticker": "X",
            "last_price": 37,
            "last_price_dollars": "0.3700",
            "status": "settled"
        }))
        .unwrap();
        assert_eq!(listing.last_price, Some(dec!(0.37)));
        assert!(listing.closed);
    }
}
