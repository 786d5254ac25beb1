//! Opinion market listings (page-numbered `/market`).

use serde_json::Value;
use tracing::debug;

use super::client::{paginate, ListingPage, ListingSource, RestClient, ScanConfig};
use super::types::{ListingScan, MarketListing, MarketMeta, Venue};
use crate::error::ListingError;
use crate::normalizer::{decimal_field, string_field, timestamp_field};

/// Opinion caps page size at 20.
const MAX_PAGE_SIZE: usize = 20;

/// Opinion listing client.
#[derive(Debug, Clone)]
pub struct OpinionSource {
    client: RestClient,
    config: ScanConfig,
}

impl OpinionSource {
    /// Create a source from scan parameters; the API key rides on every request.
    pub fn new(config: ScanConfig) -> Result<Self, ListingError> {
        let client = match config.opinion_api_key.as_deref() {
            Some(key) => RestClient::new(&config, &[("apikey", key)])?,
            None => RestClient::new(&config, &[])?,
        };
        Ok(Self { client, config })
    }

    async fn fetch_page(&self, cursor: Option<String>) -> Result<ListingPage, ListingError> {
        let page: usize = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| ListingError::Parse(format!("bad page cursor {c}")))?,
            None => 1,
        };
        let limit = self.config.page_size.min(MAX_PAGE_SIZE);
        let query = [
            ("page", page.to_string()),
            ("limit", limit.to_string()),
            ("status", "activated".to_string()),
        ];
        let body = self
            .client
            .get_json(&self.config.opinion_api_url, "market", &query)
            .await?;
        parse_market_page(&body, page, limit)
    }
}

impl ListingSource for OpinionSource {
    fn venue(&self) -> Venue {
        Venue::Opinion
    }

    async fn fetch_listings(&self) -> ListingScan {
        paginate(Venue::Opinion, &self.config, |cursor| self.fetch_page(cursor)).await
    }
}

/// Parse an `{errno, result: {list}}` envelope into a page.
pub fn parse_market_page(body: &Value, page: usize, limit: usize) -> Result<ListingPage, ListingError> {
    let errno = body.get("errno").and_then(Value::as_i64).unwrap_or(0);
    if errno != 0 {
        let message = string_field(body, "errmsg").unwrap_or_default();
        return Err(ListingError::Parse(format!("opinion errno {errno}: {message}")));
    }
    let rows = body
        .get("result")
        .and_then(|r| r.get("list"))
        .and_then(Value::as_array)
        .ok_or_else(|| ListingError::Parse("opinion market: missing result.list".to_string()))?;

    let listings: Vec<MarketListing> = rows.iter().filter_map(parse_market).collect();
    if listings.len() < rows.len() {
        debug!(skipped = rows.len() - listings.len(), "Skipped unparseable Opinion rows");
    }
    let next = (rows.len() >= limit).then(|| (page + 1).to_string());
    Ok(ListingPage { listings, next })
}

/// Parse one Opinion market row.
pub fn parse_market(row: &Value) -> Option<MarketListing> {
    let market_id = string_field(row, "marketId")?;
    let mut listing = MarketListing::new(Venue::Opinion, market_id);

    listing.meta = MarketMeta {
        slug: string_field(row, "slug"),
        event_slug: None,
        title: string_field(row, "marketTitle"),
    };
    listing.yes_token_id = string_field(row, "yesTokenId");
    listing.no_token_id = string_field(row, "noTokenId");
    listing.volume_24h = decimal_field(row, "volume24h").unwrap_or_default();
    listing.liquidity = decimal_field(row, "liquidity").unwrap_or_default();
    listing.last_price = decimal_field(row, "yesPrice");
    listing.end_time_ms = timestamp_field(row, "cutoffAt");
    listing.closed = match row.get("status") {
        Some(Value::String(s)) => !s.eq_ignore_ascii_case("activated"),
        // Numeric statuses: 2 is activated.
        Some(Value::Number(n)) => n.as_i64() != Some(2),
        _ => false,
    };
    Some(listing)
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
            "errno": 0,
            "result": {"list": [
                {
                    "marketId": 1274,
                    "marketTitle": "BTC above 100k?",
                    "yesTokenId": "y-1274",
                    "noTokenId": "n-1274",
                    "volume24h": "8800.5",
                    "cutoffAt": 1_700_000_000,
                    "status": "Activated"
                },
                {"marketTitle": "missing id"}
            ]}
        });

        let page = parse_market_page(&body, 3, 2).unwrap();
        assert_eq!(page.next.as_deref(), Some("4"));
        assert_eq!(page.listings.len(), 1);

        let listing = &page.listings[0];
        assert_eq!(listing.market_id, "1274");
        assert_eq!(listing.yes_token_id.as_deref(), Some("y-1274"));
        assert_eq!(listing.volume_24h, dec!(8800.5));
        assert_eq!(listing.end_time_ms, Some(1_700_000_000_000));
        assert!(!listing.closed);
    }

    #[test]
    fn short_page_is_last() {
        let body = json!({"errno": 0, "result": {"list": []}});
        assert!(parse_market_page(&body, 1, 20).unwrap().next.is_none());
    }

    #[test]
    fn errno_fails_the_page() {
        let body = json!({"errno": 10403, "errmsg": "invalid apikey"});
        let err = parse_market_page(&body, 1, 20).unwrap_err();
        assert!(err.to_string().contains("invalid apikey"));
    }

    #[test]
    fn resolved_market_is_closed() {
        let listing = parse_market(&json!({"marketId": "9", "status": 4})).unwrap();
        assert!(listing.closed);
    }
}
