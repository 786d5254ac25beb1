//! Market data shared across venues.
//!
//! This module handles:
//! - Venue-agnostic listing, trader and position types
//! - Bounded REST pagination shared by every venue
//! - Per-venue listing sources (Polymarket, Kalshi, Opinion)
//! - A scripted source for tests

pub mod client;
pub mod kalshi;
pub mod mock;
pub mod opinion;
pub mod polymarket;
pub mod types;

pub use client::{paginate, ListingPage, ListingSource, PageGuard, RestClient, ScanConfig};
pub use kalshi::KalshiSource;
pub use mock::MockListingSource;
pub use opinion::OpinionSource;
pub use polymarket::PolymarketSource;
pub use types::{
    ListingScan, MarketListing, MarketMeta, Outcome, PositionSnapshot, RankedTrader, TraderPosition,
    Venue,
};
