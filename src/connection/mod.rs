//! Live venue connections.
//!
//! This module handles:
//! - The per-connection state machine (heartbeat liveness, backoff)
//! - The desired-subscription set, debounced and chunked
//! - Venue subscribe/heartbeat frames
//! - The transport task that feeds normalized events to the engine

pub mod manager;
pub mod protocol;
pub mod state;
pub mod subscription;

use std::time::Duration;

use crate::market::Venue;

pub use manager::{spawn_connection, ConnectionCommand, ConnectionHandle, ConnectionTask};
pub use protocol::VenueProtocol;
pub use state::{ConnectionMachine, ConnectionState, HeartbeatAction};
pub use subscription::{SubscriptionBatch, SubscriptionPlanner};

/// Heartbeat thresholds of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    /// Probe interval.
    pub interval_ms: u64,
    /// Silence after which the connection is flagged late.
    pub warn_after_ms: u64,
    /// Consecutive unanswered probes that tear the connection down.
    pub reconnect_after_consecutive: u32,
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            warn_after_ms: 20_000,
            reconnect_after_consecutive: 3,
        }
    }
}

/// Exponential reconnect backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// First delay.
    pub base_delay_ms: u64,
    /// Delay ceiling.
    pub max_delay_ms: u64,
    /// Attempts before giving up; 0 retries forever.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before reconnect attempt `attempt` (0-based): `base * 2^attempt`,
    /// capped at the ceiling.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay_ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// Whether `attempts` failed attempts exhaust the budget.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

/// Subscription batching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionPolicy {
    /// Ids per subscribe frame.
    pub chunk_size: usize,
    /// Quiet period that coalesces desired-set changes.
    pub debounce_ms: u64,
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            debounce_ms: 100,
        }
    }
}

/// Everything one venue connection needs.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Venue served.
    pub venue: Venue,
    /// Websocket URL.
    pub url: String,
    /// Liveness policy.
    pub heartbeat: HeartbeatPolicy,
    /// Reconnect policy.
    pub backoff: BackoffPolicy,
    /// Subscription batching.
    pub subscription: SubscriptionPolicy,
}
