//! Shared REST plumbing for listing, leaderboard and position scans.

use std::future::Future;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};
use url::Url;

use super::types::{ListingScan, MarketListing, Venue};
use crate::error::ListingError;
use crate::metrics;

/// REST scan parameters.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Polymarket Gamma API base URL.
    pub polymarket_gamma_url: String,
    /// Polymarket data API base URL (leaderboard, positions).
    pub polymarket_data_url: String,
    /// Kalshi trade API base URL.
    pub kalshi_api_url: String,
    /// Opinion open API base URL.
    pub opinion_api_url: String,
    /// Opinion API key.
    pub opinion_api_key: Option<String>,
    /// Per-request timeout.
    pub http_timeout_ms: u64,
    /// Rows requested per page.
    pub page_size: usize,
    /// Maximum pages per scan.
    pub max_pages: usize,
    /// Maximum wall time per scan.
    pub max_duration_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            polymarket_gamma_url: "https://gamma-api.polymarket.com".to_string(),
            polymarket_data_url: "https://data-api.polymarket.com".to_string(),
            kalshi_api_url: "https://api.elections.kalshi.com/trade-api/v2".to_string(),
            opinion_api_url: "https://proxy.opinion.trade:8443/openapi".to_string(),
            opinion_api_key: None,
            http_timeout_ms: 10_000,
            page_size: 500,
            max_pages: 50,
            max_duration_ms: 60_000,
        }
    }
}

/// Bounds one paginated scan by page count and wall time.
#[derive(Debug)]
pub struct PageGuard {
    max_pages: usize,
    deadline: Instant,
    pages: usize,
}

impl PageGuard {
    /// Start a guard now.
    pub fn new(max_pages: usize, max_duration: Duration) -> Self {
        Self {
            max_pages,
            deadline: Instant::now() + max_duration,
            pages: 0,
        }
    }

    /// Why the next page may not be fetched, if it may not.
    pub fn stop_reason(&self) -> Option<&'static str> {
        if self.pages >= self.max_pages {
            Some("max pages reached")
        } else if Instant::now() >= self.deadline {
            Some("max duration reached")
        } else {
            None
        }
    }

    /// Count a fetched page.
    pub fn record_page(&mut self) {
        self.pages += 1;
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }
}

/// One page of listings plus the cursor of the next page.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// Parsed rows.
    pub listings: Vec<MarketListing>,
    /// Cursor for the next page; `None` on the last page.
    pub next: Option<String>,
}

/// A venue's periodic market listing.
pub trait ListingSource: Send + Sync {
    /// Venue listed.
    fn venue(&self) -> Venue;

    /// Run one bounded scan. Failures end the scan with what was collected.
    fn fetch_listings(&self) -> impl Future<Output = ListingScan> + Send;
}

/// Drive `fetch_page` from the first cursor until the last page, a failed
/// page or the guard.
pub async fn paginate<F, Fut>(venue: Venue, config: &ScanConfig, mut fetch_page: F) -> ListingScan
where
    F: FnMut(Option<String>) -> Fut + Send,
    Fut: Future<Output = Result<ListingPage, ListingError>> + Send,
{
    let started = Instant::now();
    let mut guard = PageGuard::new(config.max_pages, Duration::from_millis(config.max_duration_ms));
    let mut scan = ListingScan::empty(venue);
    let mut cursor = None;

    loop {
        if let Some(reason) = guard.stop_reason() {
            warn!(venue = %venue, pages = guard.pages(), reason, "Listing scan cut short");
            scan.truncated = true;
            scan.error = Some(reason.to_string());
            break;
        }
        match fetch_page(cursor.take()).await {
            Ok(page) => {
                guard.record_page();
                metrics::inc_scan_pages(venue);
                let last = page.next.is_none() || page.listings.is_empty();
                scan.listings.extend(page.listings);
                if last {
                    scan.complete = true;
                    break;
                }
                cursor = page.next;
            }
            Err(e) => {
                warn!(venue = %venue, pages = guard.pages(), error = %e, "Listing page failed");
                metrics::inc_scan_failures("listings");
                scan.error = Some(e.to_string());
                break;
            }
        }
    }

    scan.pages = guard.pages();
    metrics::record_scan_duration(started, "listings");
    debug!(
        venue = %venue,
        pages = scan.pages,
        listings = scan.listings.len(),
        complete = scan.complete,
        "Listing scan finished"
    );
    scan
}

/// JSON-over-HTTP client shared by the venue sources.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
}

impl RestClient {
    /// Build a client with the scan timeout and optional default headers.
    pub fn new(config: &ScanConfig, headers: &[(&'static str, &str)]) -> Result<Self, ListingError> {
        let mut default_headers = HeaderMap::new();
        for &(name, value) in headers {
            let value = HeaderValue::from_str(value)
                .map_err(|e| ListingError::Parse(format!("invalid header {name}: {e}")))?;
            default_headers.insert(HeaderName::from_static(name), value);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("prediction-signals/", env!("CARGO_PKG_VERSION")))
            .default_headers(default_headers)
            .build()?;
        Ok(Self { http })
    }

    /// GET `base/path?query` and decode the JSON body.
    #[instrument(skip(self, query))]
    pub async fn get_json(
        &self,
        base: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Value, ListingError> {
        let url = endpoint(base, path)?;
        let response = self.http.get(url.clone()).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ListingError::Parse(format!("invalid JSON from {url}: {e}")))
    }
}

/// Append `path` segments to `base`, keeping any path `base` already has.
pub fn endpoint(base: &str, path: &str) -> Result<Url, ListingError> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|_| ListingError::Parse(format!("{base} cannot be a base url")))?
        .pop_if_empty()
        .extend(path.split('/').filter(|s| !s.is_empty()));
    Ok(url)
}

/// Parse an RFC 3339 timestamp into Unix milliseconds.
pub fn rfc3339_ms(text: &str) -> Option<i64> {
    let parsed = OffsetDateTime::parse(text.trim(), &Rfc3339).ok()?;
    i64::try_from(parsed.unix_timestamp_nanos() / 1_000_000).ok()
}

/// Read a list that venues send either as a JSON array or as a JSON string
/// holding an array.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(text)) => serde_json::from_str(text).unwrap_or_default(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(max_pages: usize) -> ScanConfig {
        ScanConfig {
            max_pages,
            ..ScanConfig::default()
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> ListingPage {
        ListingPage {
            listings: ids
                .iter()
                .map(|id| MarketListing::new(Venue::Kalshi, *id))
                .collect(),
            next: next.map(str::to_string),
        }
    }

    #[test]
    fn rfc3339_parses_to_millis() {
        assert_eq!(rfc3339_ms("2023-11-14T22:13:20Z"), Some(1_700_000_000_000));
        assert_eq!(rfc3339_ms("2023-11-14T22:13:20.5+00:00"), Some(1_700_000_000_500));
        assert_eq!(rfc3339_ms("tomorrow"), None);
    }

    #[test]
    fn string_list_accepts_encoded_arrays() {
        let v = serde_json::json!({"a": "[\"1\", \"2\"]", "b": ["x"], "c": 5});
        assert_eq!(string_list(v.get("a")), vec!["1", "2"]);
        assert_eq!(string_list(v.get("b")), vec!["x"]);
        assert!(string_list(v.get("c")).is_empty());
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let url = endpoint("https://api.elections.kalshi.com/trade-api/v2", "markets").unwrap();
        assert_eq!(url.as_str(), "https://api.elections.kalshi.com/trade-api/v2/markets");

        let url = endpoint("https://gamma-api.polymarket.com/", "/markets").unwrap();
        assert_eq!(url.as_str(), "https://gamma-api.polymarket.com/markets");

        assert!(endpoint("not a url", "markets").is_err());
    }

    #[tokio::test]
    async fn paginate_follows_cursors_to_the_end() {
        let calls = AtomicUsize::new(0);
        let scan = paginate(Venue::Kalshi, &config(10), |cursor| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match (n, cursor.as_deref()) {
                    (0, None) => Ok(page(&["a", "b"], Some("c1"))),
                    (1, Some("c1")) => Ok(page(&["c"], None)),
                    other => panic!("unexpected call {other:?}"),
                }
            }
        })
        .await;

        assert!(scan.complete);
        assert_eq!(scan.pages, 2);
        assert_eq!(scan.listings.len(), 3);
        assert_eq!(scan.error, None);
    }

    #[tokio::test]
    async fn failed_page_keeps_partial_results() {
        let calls = AtomicUsize::new(0);
        let scan = paginate(Venue::Kalshi, &config(10), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok(page(&["a"], Some("next")))
                } else {
                    Err(ListingError::Parse("boom".to_string()))
                }
            }
        })
        .await;

        assert!(!scan.complete);
        assert_eq!(scan.listings.len(), 1);
        assert!(!scan.ended_cleanly());
        assert!(scan.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn page_guard_bounds_endless_pagination() {
        let scan = paginate(Venue::Kalshi, &config(3), |_| async {
            Ok(page(&["x"], Some("again")))
        })
        .await;

        assert!(!scan.complete);
        assert!(scan.truncated);
        assert!(scan.ended_cleanly());
        assert_eq!(scan.pages, 3);
        assert_eq!(scan.error.as_deref(), Some("max pages reached"));
    }
}
