//! Venue-agnostic market types shared by every component.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// A prediction-market exchange the engine listens to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Venue {
    /// Polymarket CLOB.
    Polymarket,
    /// Kalshi exchange.
    Kalshi,
    /// Opinion exchange.
    Opinion,
}

impl Venue {
    /// Static label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Outcome leg of a binary market.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Outcome {
    /// YES leg.
    #[strum(serialize = "yes", serialize = "up")]
    Yes,
    /// NO leg.
    #[strum(serialize = "no", serialize = "down")]
    No,
    /// Not known yet (no listing registration seen for this token).
    #[default]
    #[strum(serialize = "unknown")]
    Unknown,
}

impl Outcome {
    /// Get the opposite outcome. `Unknown` has no opposite.
    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
            Outcome::Unknown => Outcome::Unknown,
        }
    }

    /// Parse a venue outcome label leniently ("Yes", "NO", "up", ...).
    pub fn from_label(label: &str) -> Self {
        label.trim().parse().unwrap_or_default()
    }
}

/// Descriptive metadata carried alongside events and signals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMeta {
    /// Market slug (or ticker).
    pub slug: Option<String>,
    /// Parent event slug.
    pub event_slug: Option<String>,
    /// Human readable title.
    pub title: Option<String>,
}

impl MarketMeta {
    /// Fill empty fields from `other` without overwriting known values.
    pub fn merge_missing(&mut self, other: &MarketMeta) {
        if self.slug.is_none() {
            self.slug.clone_from(&other.slug);
        }
        if self.event_slug.is_none() {
            self.event_slug.clone_from(&other.event_slug);
        }
        if self.title.is_none() {
            self.title.clone_from(&other.title);
        }
    }
}

/// One market row from a periodic REST listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketListing {
    /// Venue the listing came from.
    pub venue: Venue,
    /// Market identifier (condition id, ticker or market id).
    pub market_id: String,
    /// Descriptive metadata.
    pub meta: MarketMeta,
    /// YES token id, when the venue has per-outcome tokens.
    pub yes_token_id: Option<String>,
    /// NO token id.
    pub no_token_id: Option<String>,
    /// Trailing 24h volume in USD.
    pub volume_24h: Decimal,
    /// Resting liquidity in USD.
    pub liquidity: Decimal,
    /// Last known YES price, if the listing carries one.
    pub last_price: Option<Decimal>,
    /// Unix milliseconds when trading ends.
    pub end_time_ms: Option<i64>,
    /// Whether the market is closed for trading.
    pub closed: bool,
}

impl MarketListing {
    /// Create a listing with only the identifying fields set.
    pub fn new(venue: Venue, market_id: impl Into<String>) -> Self {
        Self {
            venue,
            market_id: market_id.into(),
            meta: MarketMeta::default(),
            yes_token_id: None,
            no_token_id: None,
            volume_24h: Decimal::ZERO,
            liquidity: Decimal::ZERO,
            last_price: None,
            end_time_ms: None,
            closed: false,
        }
    }

    /// Get the token id for a given outcome.
    pub fn token_id(&self, outcome: Outcome) -> Option<&str> {
        match outcome {
            Outcome::Yes => self.yes_token_id.as_deref(),
            Outcome::No => self.no_token_id.as_deref(),
            Outcome::Unknown => None,
        }
    }

    /// Ids the venue's stream protocol subscribes with for this listing.
    ///
    /// Polymarket subscribes per token; Kalshi and Opinion per market.
    pub fn subscription_ids(&self) -> Vec<String> {
        match self.venue {
            Venue::Polymarket => [&self.yes_token_id, &self.no_token_id]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
            Venue::Kalshi | Venue::Opinion => vec![self.market_id.clone()],
        }
    }

    /// Remaining milliseconds until close, `None` when unknown or past.
    pub fn time_remaining_ms(&self, now_ms: i64) -> Option<i64> {
        let end = self.end_time_ms?;
        let remaining = end - now_ms;
        (remaining > 0).then_some(remaining)
    }
}

/// A ranked trader address tracked by the smart-money detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedTrader {
    /// Wallet address.
    pub address: String,
    /// Leaderboard rank (1 = best).
    pub rank: u32,
    /// Display name when the venue exposes one.
    pub name: Option<String>,
    /// Realized + unrealized PnL for the ranking period.
    pub pnl: Decimal,
}

/// One open position held by a tracked trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderPosition {
    /// Market identifier.
    pub market_id: String,
    /// Token (asset) id of the held outcome.
    pub token_id: String,
    /// Outcome held.
    pub outcome: Outcome,
    /// Shares held.
    pub size: Decimal,
    /// Current USD value of the position.
    pub value: Decimal,
    /// Average entry price.
    pub avg_price: Decimal,
    /// Descriptive metadata.
    pub meta: MarketMeta,
}

/// Result of one bounded listing scan of a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingScan {
    /// Venue scanned.
    pub venue: Venue,
    /// Listings collected, in page order.
    pub listings: Vec<MarketListing>,
    /// Pages fetched.
    pub pages: usize,
    /// Whether pagination ran to the end without error or guard cutoff.
    pub complete: bool,
    /// Whether the page or time guard stopped the scan before the last page.
    #[serde(default)]
    pub truncated: bool,
    /// Error or guard reason that ended the scan early.
    pub error: Option<String>,
}

impl ListingScan {
    /// An empty scan that has not fetched anything yet.
    pub fn empty(venue: Venue) -> Self {
        Self {
            venue,
            listings: Vec::new(),
            pages: 0,
            complete: false,
            truncated: false,
            error: None,
        }
    }

    /// A finished scan over `listings`.
    pub fn complete(venue: Venue, listings: Vec<MarketListing>) -> Self {
        Self {
            venue,
            listings,
            pages: 1,
            complete: true,
            truncated: false,
            error: None,
        }
    }

    /// Whether no page fetch failed: the scan reached the last page or only
    /// the guard stopped it.
    pub fn ended_cleanly(&self) -> bool {
        self.complete || self.truncated
    }
}

/// Current positions of one tracked trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Trader the positions belong to.
    pub trader: RankedTrader,
    /// Open positions.
    pub positions: Vec<TraderPosition>,
    /// Unix milliseconds of the fetch.
    pub fetched_ms: i64,
}
