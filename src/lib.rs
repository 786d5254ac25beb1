//! Real-time signal detection for prediction-market venues.
//!
//! The engine listens to Polymarket, Kalshi and Opinion market streams,
//! keeps the latest price and order book per outcome token, and runs ten
//! pattern detectors over every update and every periodic REST scan:
//!
//! ```text
//! venue socket -> normalizer -> dispatch loop -> store -> detectors -> rate governor -> sinks
//! REST scans   ---------------^
//! ```
//!
//! Everything that mutates shared state happens on the single dispatch
//! path, so detectors never race each other for the store.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Venue-agnostic market types and REST listing sources
//! - [`normalizer`]: Venue wire frames to normalized events
//! - [`connection`]: Per-venue websocket state machine and subscriptions
//! - [`orderbook`]: Order book snapshots, walks and price ladders
//! - [`store`]: Market State Store (price cache, books, token index)
//! - [`governor`]: Cooldown and hourly quota gates
//! - [`detector`]: The detectors and the pipeline that runs them
//! - [`engine`]: Dispatch loop and background scan tasks
//! - [`delivery`]: Signal sinks and subscriber preferences
//! - [`api`]: HTTP API for health, status and metrics
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod config;
pub mod connection;
pub mod delivery;
pub mod detector;
pub mod engine;
pub mod error;
pub mod governor;
pub mod market;
pub mod metrics;
pub mod normalizer;
pub mod orderbook;
pub mod store;
pub mod utils;

pub use config::Config;
pub use error::{EngineError, Result};
