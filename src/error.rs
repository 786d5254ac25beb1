//! Unified error types for the signal engine.
//!
//! Only infrastructure fails with an error. Detectors report "insufficient
//! data" as `None` and rate-governed suppression is a counter, not an error.

use thiserror::Error;

/// Unified error type for the signal engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// REST listing or position fetch error.
    #[error("listing error: {0}")]
    Listing(#[from] ListingError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors. Raised once at startup, never at runtime.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment could not be deserialized.
    #[error("failed to read environment: {0}")]
    Env(#[from] envy::Error),

    /// A field holds a value outside its allowed range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Environment variable name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// A venue name in `ENABLED_VENUES` is not recognized.
    #[error("unknown venue: {0}")]
    UnknownVenue(String),
}

impl ConfigError {
    /// Shorthand for an [`ConfigError::Invalid`] error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Listing, leaderboard and position fetch errors.
#[derive(Error, Debug)]
pub enum ListingError {
    /// HTTP request failed.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Response body did not have the expected shape.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Invalid base URL in configuration.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// Too many consecutive heartbeats went unanswered.
    #[error("heartbeat timeout after {missed} missed probes")]
    HeartbeatTimeout {
        /// Consecutive missed heartbeats.
        missed: u32,
    },

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_field() {
        let err = ConfigError::invalid("ARB_MIN_PROFIT", "must be >= 0");
        assert_eq!(err.to_string(), "invalid ARB_MIN_PROFIT: must be >= 0");
    }

    #[test]
    fn engine_error_wraps_config_error() {
        let err: EngineError = ConfigError::UnknownVenue("binance".to_string()).into();
        assert!(err.to_string().contains("unknown venue: binance"));
    }
}
