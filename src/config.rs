//! Application configuration loaded from environment variables.
//!
//! Every field has a default so an empty environment yields a runnable
//! engine. Thresholds are validated once at startup; a bad value fails fast
//! with the offending variable name.

use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::connection::{BackoffPolicy, ConnectionConfig, HeartbeatPolicy, SubscriptionPolicy};
use crate::detector::{
    ArbitrageConfig, ClosingSoonConfig, DeepArbitrageConfig, DetectorSettings, ImbalanceConfig,
    LargeTradeConfig, LiquidityConfig, NewMarketConfig, SignalKind, SkewConfig, SmartMoneyConfig,
    SpikeConfig,
};
use crate::error::ConfigError;
use crate::governor::GovernorConfig;
use crate::market::{ScanConfig, Venue};
use crate::store::StoreConfig;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === General ===
    /// Comma separated venues to connect to.
    #[serde(default = "default_enabled_venues")]
    pub enabled_venues: String,

    /// Comma separated detector kinds to switch off.
    #[serde(default)]
    pub disabled_detectors: String,

    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    // === WebSocket Endpoints ===
    /// Polymarket market channel URL.
    #[serde(default = "default_polymarket_ws_url")]
    pub polymarket_ws_url: String,

    /// Kalshi v2 websocket URL.
    #[serde(default = "default_kalshi_ws_url")]
    pub kalshi_ws_url: String,

    /// Opinion websocket URL.
    #[serde(default = "default_opinion_ws_url")]
    pub opinion_ws_url: String,

    // === Connection Parameters ===
    /// Heartbeat probe interval in milliseconds.
    #[serde(default = "default_ws_ping_interval_ms")]
    pub ws_ping_interval_ms: u64,

    /// A probe with no liveness signal for this long counts as missed.
    #[serde(default = "default_ws_warn_after_ms")]
    pub ws_warn_after_ms: u64,

    /// Consecutive missed probes before the connection is torn down.
    #[serde(default = "default_ws_reconnect_after_consecutive")]
    pub ws_reconnect_after_consecutive: u32,

    /// Initial reconnect delay in milliseconds.
    #[serde(default = "default_ws_reconnect_delay_ms")]
    pub ws_reconnect_delay_ms: u64,

    /// Maximum reconnect delay in milliseconds.
    #[serde(default = "default_ws_reconnect_delay_max_ms")]
    pub ws_reconnect_delay_max_ms: u64,

    /// Maximum reconnect attempts (0 = unlimited).
    #[serde(default)]
    pub ws_max_reconnect_attempts: u32,

    /// Ids per subscribe/unsubscribe frame.
    #[serde(default = "default_subscription_chunk_size")]
    pub subscription_chunk_size: usize,

    /// Window that coalesces subscription changes, in milliseconds.
    #[serde(default = "default_subscription_debounce_ms")]
    pub subscription_debounce_ms: u64,

    /// Maximum subscribed ids per venue.
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions: usize,

    // === REST Endpoints ===
    /// Polymarket Gamma API base URL.
    #[serde(default = "default_polymarket_gamma_url")]
    pub polymarket_gamma_url: String,

    /// Polymarket data API base URL (leaderboard, positions).
    #[serde(default = "default_polymarket_data_url")]
    pub polymarket_data_url: String,

    /// Kalshi REST base URL.
    #[serde(default = "default_kalshi_api_url")]
    pub kalshi_api_url: String,

    /// Opinion REST base URL.
    #[serde(default = "default_opinion_api_url")]
    pub opinion_api_url: String,

    /// Opinion API key, sent as the `apikey` header.
    #[serde(default)]
    pub opinion_api_key: Option<String>,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    // === Listing Scans ===
    /// Seconds between listing refreshes.
    #[serde(default = "default_listing_refresh_secs")]
    pub listing_refresh_secs: u64,

    /// Rows requested per listing page.
    #[serde(default = "default_scan_page_size")]
    pub scan_page_size: usize,

    /// Maximum pages fetched per scan.
    #[serde(default = "default_scan_max_pages")]
    pub scan_max_pages: usize,

    /// Maximum wall time per scan in seconds.
    #[serde(default = "default_scan_max_duration_secs")]
    pub scan_max_duration_secs: u64,

    // === Market State Store ===
    /// A cached price older than this is stale.
    #[serde(default = "default_max_price_age_ms")]
    pub max_price_age_ms: i64,

    /// Maximum timestamp difference between two legs.
    #[serde(default = "default_max_time_skew_ms")]
    pub max_time_skew_ms: i64,

    /// Maximum cached tokens.
    #[serde(default = "default_price_cache_capacity")]
    pub price_cache_capacity: usize,

    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Entries older than this are removed by the sweep.
    #[serde(default = "default_sweep_max_age_ms")]
    pub sweep_max_age_ms: i64,

    // === Rate Governor ===
    /// Minimum seconds between two signals for the same detector and key.
    #[serde(default = "default_signal_cooldown_secs")]
    pub signal_cooldown_secs: u64,

    /// Maximum signals per detector per rolling hour.
    #[serde(default = "default_max_signals_per_hour")]
    pub max_signals_per_hour: usize,

    /// Maximum cooldown keys retained.
    #[serde(default = "default_cooldown_capacity")]
    pub cooldown_capacity: usize,

    /// Signals kept per detector for display.
    #[serde(default = "default_alert_history_size")]
    pub alert_history_size: usize,

    // === Arbitrage ===
    /// Minimum net profit per $1 payout.
    #[serde(default = "default_arb_min_profit")]
    pub arb_min_profit: Decimal,

    /// Taker fee rate per leg.
    #[serde(default = "default_arb_fee_rate")]
    pub arb_fee_rate: Decimal,

    /// Expected slippage per leg.
    #[serde(default = "default_arb_slippage")]
    pub arb_slippage: Decimal,

    /// Minimum USD depth on each leg.
    #[serde(default = "default_arb_min_depth")]
    pub arb_min_depth: Decimal,

    /// Minimum net profit for implied (mirror-book) arbitrage.
    #[serde(default = "default_arb_min_profit")]
    pub deep_arb_min_profit: Decimal,

    // === Order-Book Imbalance ===
    /// Minimum dominant/other depth ratio.
    #[serde(default = "default_imbalance_min_ratio")]
    pub imbalance_min_ratio: Decimal,

    /// Minimum USD depth on the dominant side.
    #[serde(default = "default_imbalance_min_depth")]
    pub imbalance_min_depth: Decimal,

    /// Minimum walked price impact on the opposing side.
    #[serde(default = "default_imbalance_min_price_impact")]
    pub imbalance_min_price_impact: Decimal,

    /// Levels summed per side.
    #[serde(default = "default_imbalance_levels")]
    pub imbalance_levels: usize,

    // === Price Spike ===
    /// Minimum relative move within the window.
    #[serde(default = "default_spike_min_change")]
    pub spike_min_change: Decimal,

    /// Window length in seconds.
    #[serde(default = "default_spike_window_secs")]
    pub spike_window_secs: u64,

    /// Minimum 24h volume (0 disables the gate).
    #[serde(default)]
    pub spike_min_volume: Decimal,

    // === Large Trade ===
    /// Minimum trade notional in USD.
    #[serde(default = "default_large_trade_min_value")]
    pub large_trade_min_value: Decimal,

    // === New Market ===
    /// Hours after which a seen market id may be announced again.
    #[serde(default = "default_new_market_ttl_hours")]
    pub new_market_ttl_hours: u64,

    /// Maximum remembered market ids.
    #[serde(default = "default_new_market_capacity")]
    pub new_market_capacity: usize,

    // === Smart Money ===
    /// Leaderboard addresses tracked.
    #[serde(default = "default_smart_money_track_top_n")]
    pub smart_money_track_top_n: usize,

    /// Minimum position value in USD.
    #[serde(default = "default_smart_money_min_position_value")]
    pub smart_money_min_position_value: Decimal,

    /// Relative size change classified as add/reduce.
    #[serde(default = "default_smart_money_change_threshold")]
    pub smart_money_change_threshold: Decimal,

    /// Seconds between position scans.
    #[serde(default = "default_smart_money_scan_interval_secs")]
    pub smart_money_scan_interval_secs: u64,

    /// Explicit comma separated addresses, replacing the leaderboard.
    #[serde(default)]
    pub smart_money_addresses: String,

    // === Liquidity / Skew ===
    /// Minimum relative depth drop.
    #[serde(default = "default_liquidity_min_drop")]
    pub liquidity_min_drop: Decimal,

    /// Minimum baseline depth in USD.
    #[serde(default = "default_liquidity_min_depth")]
    pub liquidity_min_depth: Decimal,

    /// Minimum absolute change of the bid share.
    #[serde(default = "default_skew_min_shift")]
    pub skew_min_shift: Decimal,

    /// Minimum total depth in USD for skew evaluation.
    #[serde(default = "default_skew_min_depth")]
    pub skew_min_depth: Decimal,

    /// Lookback for liquidity and skew comparisons, in seconds.
    #[serde(default = "default_book_lookback_secs")]
    pub book_lookback_secs: u64,

    /// Levels summed per side for liquidity and skew.
    #[serde(default = "default_book_levels")]
    pub book_levels: usize,

    // === Closing Soon ===
    /// Horizon in hours.
    #[serde(default = "default_closing_soon_window_hours")]
    pub closing_soon_window_hours: u64,

    /// Markets per emitted batch.
    #[serde(default = "default_closing_soon_top_n")]
    pub closing_soon_top_n: usize,

    /// Minimum 24h volume in USD.
    #[serde(default = "default_closing_soon_min_volume")]
    pub closing_soon_min_volume: Decimal,

    /// Seconds between closing-soon scans.
    #[serde(default = "default_closing_soon_scan_interval_secs")]
    pub closing_soon_scan_interval_secs: u64,
}

fn default_enabled_venues() -> String {
    "polymarket,kalshi,opinion".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_polymarket_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_kalshi_ws_url() -> String {
    "wss://api.elections.kalshi.com/trade-api/ws/v2".to_string()
}

fn default_opinion_ws_url() -> String {
    "wss://ws.opinion.trade".to_string()
}

fn default_ws_ping_interval_ms() -> u64 {
    10_000
}

fn default_ws_warn_after_ms() -> u64 {
    30_000
}

fn default_ws_reconnect_after_consecutive() -> u32 {
    3
}

fn default_ws_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_ws_reconnect_delay_max_ms() -> u64 {
    60_000
}

fn default_subscription_chunk_size() -> usize {
    200
}

fn default_subscription_debounce_ms() -> u64 {
    100
}

fn default_max_subscriptions() -> usize {
    2_000
}

fn default_polymarket_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_polymarket_data_url() -> String {
    "https://data-api.polymarket.com".to_string()
}

fn default_kalshi_api_url() -> String {
    "https://api.elections.kalshi.com/trade-api/v2".to_string()
}

fn default_opinion_api_url() -> String {
    "https://proxy.opinion.trade:8443/openapi".to_string()
}

fn default_http_timeout_ms() -> u64 {
    10_000
}

fn default_listing_refresh_secs() -> u64 {
    300
}

fn default_scan_page_size() -> usize {
    500
}

fn default_scan_max_pages() -> usize {
    50
}

fn default_scan_max_duration_secs() -> u64 {
    60
}

fn default_max_price_age_ms() -> i64 {
    60_000
}

fn default_max_time_skew_ms() -> i64 {
    30_000
}

fn default_price_cache_capacity() -> usize {
    50_000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_sweep_max_age_ms() -> i64 {
    600_000
}

fn default_signal_cooldown_secs() -> u64 {
    300
}

fn default_max_signals_per_hour() -> usize {
    60
}

fn default_cooldown_capacity() -> usize {
    50_000
}

fn default_alert_history_size() -> usize {
    100
}

fn default_arb_min_profit() -> Decimal {
    Decimal::new(3, 3) // 0.003
}

fn default_arb_fee_rate() -> Decimal {
    Decimal::new(2, 3) // 0.002
}

fn default_arb_slippage() -> Decimal {
    Decimal::new(5, 3) // 0.005
}

fn default_arb_min_depth() -> Decimal {
    Decimal::new(100, 0)
}

fn default_imbalance_min_ratio() -> Decimal {
    Decimal::new(10, 0)
}

fn default_imbalance_min_depth() -> Decimal {
    Decimal::new(1_000, 0)
}

fn default_imbalance_min_price_impact() -> Decimal {
    Decimal::new(1, 2) // 1%
}

fn default_imbalance_levels() -> usize {
    3
}

fn default_spike_min_change() -> Decimal {
    Decimal::new(10, 2) // 10%
}

fn default_spike_window_secs() -> u64 {
    300
}

fn default_large_trade_min_value() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_new_market_ttl_hours() -> u64 {
    168
}

fn default_new_market_capacity() -> usize {
    100_000
}

fn default_smart_money_track_top_n() -> usize {
    50
}

fn default_smart_money_min_position_value() -> Decimal {
    Decimal::new(5_000, 0)
}

fn default_smart_money_change_threshold() -> Decimal {
    Decimal::new(20, 2) // 20%
}

fn default_smart_money_scan_interval_secs() -> u64 {
    300
}

fn default_liquidity_min_drop() -> Decimal {
    Decimal::new(50, 2) // 50%
}

fn default_liquidity_min_depth() -> Decimal {
    Decimal::new(1_000, 0)
}

fn default_skew_min_shift() -> Decimal {
    Decimal::new(25, 2)
}

fn default_skew_min_depth() -> Decimal {
    Decimal::new(500, 0)
}

fn default_book_lookback_secs() -> u64 {
    60
}

fn default_book_levels() -> usize {
    5
}

fn default_closing_soon_window_hours() -> u64 {
    24
}

fn default_closing_soon_top_n() -> usize {
    10
}

fn default_closing_soon_min_volume() -> Decimal {
    Decimal::new(1_000, 0)
}

fn default_closing_soon_scan_interval_secs() -> u64 {
    600
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Build configuration from explicit key/value pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Ok(envy::from_iter(vars)?)
    }

    /// Check that every threshold is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let venues = self.enabled_venues()?;
        if venues.is_empty() {
            return Err(ConfigError::invalid("ENABLED_VENUES", "at least one venue is required"));
        }
        self.disabled_detectors()?;

        if self.ws_ping_interval_ms == 0 {
            return Err(ConfigError::invalid("WS_PING_INTERVAL_MS", "must be > 0"));
        }
        if self.ws_warn_after_ms == 0 {
            return Err(ConfigError::invalid("WS_WARN_AFTER_MS", "must be > 0"));
        }
        if self.ws_reconnect_after_consecutive == 0 {
            return Err(ConfigError::invalid("WS_RECONNECT_AFTER_CONSECUTIVE", "must be > 0"));
        }
        if self.ws_reconnect_delay_ms == 0 {
            return Err(ConfigError::invalid("WS_RECONNECT_DELAY_MS", "must be > 0"));
        }
        if self.ws_reconnect_delay_ms > self.ws_reconnect_delay_max_ms {
            return Err(ConfigError::invalid(
                "WS_RECONNECT_DELAY_MAX_MS",
                "must be >= WS_RECONNECT_DELAY_MS",
            ));
        }
        if self.subscription_chunk_size == 0 {
            return Err(ConfigError::invalid("SUBSCRIPTION_CHUNK_SIZE", "must be > 0"));
        }
        if self.max_subscriptions == 0 {
            return Err(ConfigError::invalid("MAX_SUBSCRIPTIONS", "must be > 0"));
        }
        if self.scan_page_size == 0 || self.scan_max_pages == 0 {
            return Err(ConfigError::invalid("SCAN_MAX_PAGES", "page size and page count must be > 0"));
        }
        if self.scan_max_duration_secs == 0 {
            return Err(ConfigError::invalid("SCAN_MAX_DURATION_SECS", "must be > 0"));
        }

        if self.max_price_age_ms <= 0 {
            return Err(ConfigError::invalid("MAX_PRICE_AGE_MS", "must be > 0"));
        }
        if self.max_time_skew_ms < 0 {
            return Err(ConfigError::invalid("MAX_TIME_SKEW_MS", "must be >= 0"));
        }
        if self.price_cache_capacity == 0 {
            return Err(ConfigError::invalid("PRICE_CACHE_CAPACITY", "must be > 0"));
        }
        if self.sweep_max_age_ms <= 0 {
            return Err(ConfigError::invalid("SWEEP_MAX_AGE_MS", "must be > 0"));
        }
        if self.max_signals_per_hour == 0 {
            return Err(ConfigError::invalid("MAX_SIGNALS_PER_HOUR", "must be > 0"));
        }
        if self.cooldown_capacity == 0 {
            return Err(ConfigError::invalid("COOLDOWN_CAPACITY", "must be > 0"));
        }
        if self.alert_history_size == 0 {
            return Err(ConfigError::invalid("ALERT_HISTORY_SIZE", "must be > 0"));
        }

        if self.arb_min_profit < Decimal::ZERO {
            return Err(ConfigError::invalid("ARB_MIN_PROFIT", "must be >= 0"));
        }
        if self.deep_arb_min_profit < Decimal::ZERO {
            return Err(ConfigError::invalid("DEEP_ARB_MIN_PROFIT", "must be >= 0"));
        }
        if !is_rate(self.arb_fee_rate) {
            return Err(ConfigError::invalid("ARB_FEE_RATE", "must be in [0, 1)"));
        }
        if !is_rate(self.arb_slippage) {
            return Err(ConfigError::invalid("ARB_SLIPPAGE", "must be in [0, 1)"));
        }
        if self.arb_min_depth < Decimal::ZERO {
            return Err(ConfigError::invalid("ARB_MIN_DEPTH", "must be >= 0"));
        }

        if self.imbalance_min_ratio <= Decimal::ONE {
            return Err(ConfigError::invalid("IMBALANCE_MIN_RATIO", "must be > 1"));
        }
        if self.imbalance_min_price_impact < Decimal::ZERO {
            return Err(ConfigError::invalid("IMBALANCE_MIN_PRICE_IMPACT", "must be >= 0"));
        }
        if self.imbalance_levels == 0 || self.book_levels == 0 {
            return Err(ConfigError::invalid("IMBALANCE_LEVELS", "level counts must be > 0"));
        }

        if self.spike_min_change <= Decimal::ZERO {
            return Err(ConfigError::invalid("SPIKE_MIN_CHANGE", "must be > 0"));
        }
        if self.spike_window_secs == 0 {
            return Err(ConfigError::invalid("SPIKE_WINDOW_SECS", "must be > 0"));
        }
        if self.large_trade_min_value <= Decimal::ZERO {
            return Err(ConfigError::invalid("LARGE_TRADE_MIN_VALUE", "must be > 0"));
        }
        if self.new_market_capacity == 0 {
            return Err(ConfigError::invalid("NEW_MARKET_CAPACITY", "must be > 0"));
        }
        if self.smart_money_track_top_n == 0 {
            return Err(ConfigError::invalid("SMART_MONEY_TRACK_TOP_N", "must be > 0"));
        }
        if self.smart_money_change_threshold <= Decimal::ZERO {
            return Err(ConfigError::invalid("SMART_MONEY_CHANGE_THRESHOLD", "must be > 0"));
        }
        if self.liquidity_min_drop <= Decimal::ZERO || self.liquidity_min_drop > Decimal::ONE {
            return Err(ConfigError::invalid("LIQUIDITY_MIN_DROP", "must be in (0, 1]"));
        }
        if self.skew_min_shift <= Decimal::ZERO || self.skew_min_shift > Decimal::ONE {
            return Err(ConfigError::invalid("SKEW_MIN_SHIFT", "must be in (0, 1]"));
        }
        if self.book_lookback_secs == 0 {
            return Err(ConfigError::invalid("BOOK_LOOKBACK_SECS", "must be > 0"));
        }
        if self.closing_soon_window_hours == 0 {
            return Err(ConfigError::invalid("CLOSING_SOON_WINDOW_HOURS", "must be > 0"));
        }
        if self.closing_soon_top_n == 0 {
            return Err(ConfigError::invalid("CLOSING_SOON_TOP_N", "must be > 0"));
        }

        Ok(())
    }

    /// Parse `ENABLED_VENUES`.
    pub fn enabled_venues(&self) -> Result<Vec<Venue>, ConfigError> {
        let mut venues = Vec::new();
        for name in split_list(&self.enabled_venues) {
            let venue =
                Venue::from_str(name).map_err(|_| ConfigError::UnknownVenue(name.to_string()))?;
            if !venues.contains(&venue) {
                venues.push(venue);
            }
        }
        Ok(venues)
    }

    /// Parse `DISABLED_DETECTORS`.
    pub fn disabled_detectors(&self) -> Result<HashSet<SignalKind>, ConfigError> {
        split_list(&self.disabled_detectors)
            .map(|name| {
                SignalKind::from_str(name).map_err(|_| {
                    ConfigError::invalid("DISABLED_DETECTORS", format!("unknown detector {name}"))
                })
            })
            .collect()
    }

    /// Explicitly configured smart-money addresses.
    pub fn smart_money_addresses(&self) -> Vec<String> {
        split_list(&self.smart_money_addresses)
            .map(str::to_lowercase)
            .collect()
    }

    /// Connection parameters for one venue.
    pub fn connection_config(&self, venue: Venue) -> ConnectionConfig {
        let url = match venue {
            Venue::Polymarket => &self.polymarket_ws_url,
            Venue::Kalshi => &self.kalshi_ws_url,
            Venue::Opinion => &self.opinion_ws_url,
        };
        ConnectionConfig {
            venue,
            url: url.clone(),
            heartbeat: HeartbeatPolicy {
                interval_ms: self.ws_ping_interval_ms,
                warn_after_ms: self.ws_warn_after_ms,
                reconnect_after_consecutive: self.ws_reconnect_after_consecutive,
            },
            backoff: BackoffPolicy {
                base_delay_ms: self.ws_reconnect_delay_ms,
                max_delay_ms: self.ws_reconnect_delay_max_ms,
                max_attempts: self.ws_max_reconnect_attempts,
            },
            subscription: SubscriptionPolicy {
                chunk_size: self.subscription_chunk_size,
                debounce_ms: self.subscription_debounce_ms,
            },
        }
    }

    /// Market State Store parameters.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            capacity: self.price_cache_capacity,
            max_price_age_ms: self.max_price_age_ms,
            sweep_max_age_ms: self.sweep_max_age_ms,
        }
    }

    /// Rate Governor parameters.
    pub fn governor_config(&self) -> GovernorConfig {
        GovernorConfig {
            max_signals_per_hour: self.max_signals_per_hour,
            cooldown_capacity: self.cooldown_capacity,
        }
    }

    /// REST scan parameters.
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            polymarket_gamma_url: self.polymarket_gamma_url.clone(),
            polymarket_data_url: self.polymarket_data_url.clone(),
            kalshi_api_url: self.kalshi_api_url.clone(),
            opinion_api_url: self.opinion_api_url.clone(),
            opinion_api_key: self.opinion_api_key.clone(),
            http_timeout_ms: self.http_timeout_ms,
            page_size: self.scan_page_size,
            max_pages: self.scan_max_pages,
            max_duration_ms: self.scan_max_duration_secs * 1000,
        }
    }

    /// Thresholds for every detector.
    pub fn detector_settings(&self) -> Result<DetectorSettings, ConfigError> {
        let cooldown_ms = (self.signal_cooldown_secs * 1000) as i64;
        let lookback_ms = (self.book_lookback_secs * 1000) as i64;

        Ok(DetectorSettings {
            disabled: self.disabled_detectors()?,
            history_size: self.alert_history_size,
            arbitrage: ArbitrageConfig {
                min_profit: self.arb_min_profit,
                fee_rate: self.arb_fee_rate,
                slippage: self.arb_slippage,
                min_depth: self.arb_min_depth,
                max_price_age_ms: self.max_price_age_ms,
                max_time_skew_ms: self.max_time_skew_ms,
                cooldown_ms,
            },
            deep_arbitrage: DeepArbitrageConfig {
                min_profit: self.deep_arb_min_profit,
                fee_rate: self.arb_fee_rate,
                slippage: self.arb_slippage,
                min_depth: self.arb_min_depth,
                max_price_age_ms: self.max_price_age_ms,
                max_time_skew_ms: self.max_time_skew_ms,
                cooldown_ms,
            },
            imbalance: ImbalanceConfig {
                min_ratio: self.imbalance_min_ratio,
                min_depth: self.imbalance_min_depth,
                min_price_impact: self.imbalance_min_price_impact,
                levels: self.imbalance_levels,
                cooldown_ms,
            },
            spike: SpikeConfig {
                min_change: self.spike_min_change,
                window_ms: (self.spike_window_secs * 1000) as i64,
                min_volume: self.spike_min_volume,
                cooldown_ms,
            },
            large_trade: LargeTradeConfig {
                min_value: self.large_trade_min_value,
                cooldown_ms,
            },
            new_market: NewMarketConfig {
                ttl_ms: (self.new_market_ttl_hours * 3_600_000) as i64,
                capacity: self.new_market_capacity,
            },
            smart_money: SmartMoneyConfig {
                track_top_n: self.smart_money_track_top_n,
                min_position_value: self.smart_money_min_position_value,
                change_threshold: self.smart_money_change_threshold,
                cooldown_ms,
            },
            liquidity: LiquidityConfig {
                min_drop: self.liquidity_min_drop,
                min_depth: self.liquidity_min_depth,
                lookback_ms,
                levels: self.book_levels,
                cooldown_ms,
            },
            skew: SkewConfig {
                min_shift: self.skew_min_shift,
                min_depth: self.skew_min_depth,
                lookback_ms,
                levels: self.book_levels,
                cooldown_ms,
            },
            closing_soon: ClosingSoonConfig {
                window_ms: (self.closing_soon_window_hours * 3_600_000) as i64,
                top_n: self.closing_soon_top_n,
                min_volume: self.closing_soon_min_volume,
            },
        })
    }
}

fn is_rate(value: Decimal) -> bool {
    value >= Decimal::ZERO && value < Decimal::ONE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        Config::from_vars(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn empty_environment_yields_valid_defaults() {
        let config = config(&[]).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.arb_min_profit, dec!(0.003));
        assert_eq!(config.imbalance_levels, 3);
        assert_eq!(config.subscription_debounce_ms, 100);
        assert_eq!(
            config.enabled_venues().unwrap(),
            vec![Venue::Polymarket, Venue::Kalshi, Venue::Opinion]
        );
    }

    #[test]
    fn reads_overrides_from_vars() {
        let config = config(&[("ARB_MIN_PROFIT", "0.01"), ("ENABLED_VENUES", "kalshi")]).unwrap();
        assert_eq!(config.arb_min_profit, dec!(0.01));
        assert_eq!(config.enabled_venues().unwrap(), vec![Venue::Kalshi]);
    }

    #[test]
    fn validate_rejects_unknown_venue() {
        let config = config(&[("ENABLED_VENUES", "polymarket,binance")]).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::UnknownVenue(v)) if v == "binance"));
    }

    #[test]
    fn validate_rejects_inverted_reconnect_bounds() {
        let config = config(&[
            ("WS_RECONNECT_DELAY_MS", "5000"),
            ("WS_RECONNECT_DELAY_MAX_MS", "1000"),
        ])
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("WS_RECONNECT_DELAY_MAX_MS"));
    }

    #[test]
    fn validate_rejects_bad_thresholds() {
        for (key, value) in [
            ("ARB_FEE_RATE", "1.5"),
            ("ARB_MIN_PROFIT", "-0.1"),
            ("IMBALANCE_MIN_RATIO", "1"),
            ("SUBSCRIPTION_CHUNK_SIZE", "0"),
            ("MAX_SIGNALS_PER_HOUR", "0"),
            ("DISABLED_DETECTORS", "arbitrage,telepathy"),
        ] {
            let config = config(&[(key, value)]).unwrap();
            assert!(config.validate().is_err(), "{key}={value} should be rejected");
        }
    }

    #[test]
    fn malformed_number_fails_to_load() {
        assert!(matches!(config(&[("PORT", "eighty")]), Err(ConfigError::Env(_))));
    }

    #[test]
    fn detector_settings_carry_thresholds() {
        let config = config(&[("SIGNAL_COOLDOWN_SECS", "60"), ("DISABLED_DETECTORS", "skew")]).unwrap();
        let settings = config.detector_settings().unwrap();
        assert_eq!(settings.arbitrage.cooldown_ms, 60_000);
        assert!(settings.disabled.contains(&SignalKind::Skew));
        assert_eq!(settings.closing_soon.window_ms, 24 * 3_600_000);
    }

    #[test]
    fn smart_money_addresses_are_lowercased() {
        let config = config(&[("SMART_MONEY_ADDRESSES", "0xABC, 0xdef,")]).unwrap();
        assert_eq!(config.smart_money_addresses(), vec!["0xabc", "0xdef"]);
    }

    #[test]
    fn smart_money_board_size_reaches_the_detector() {
        let config = config(&[("SMART_MONEY_TRACK_TOP_N", "10")]).unwrap();
        assert_eq!(config.detector_settings().unwrap().smart_money.track_top_n, 10);
    }

    #[test]
    fn log_filter_is_left_to_tracing() {
        // RUST_LOG belongs to the tracing filter, not the config.
        let config = config(&[("RUST_LOG", "debug"), ("PORT", "9000")]).unwrap();
        assert_eq!(config.port, 9000);
    }
}
