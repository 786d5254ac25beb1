//! Order book module for managing market data.
//!
//! This module handles:
//! - Order book types and data structures
//! - Book walking and depth calculations
//! - Price ladders for venues that stream deltas

pub mod aggregator;
pub mod ladder;
pub mod types;

pub use aggregator::{bid_share, mid_price, price_impact, walk_notional};
pub use ladder::PriceLadder;
pub use types::{NotionalWalk, OrderBookSnapshot, PriceLevel, Side};
