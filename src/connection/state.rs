//! Connection lifecycle: `Disconnected -> Connecting -> Connected ->
//! {HeartbeatOk, HeartbeatLate} -> Disconnected`.
//!
//! The machine is driven with explicit timestamps; the transport task feeds
//! it and acts on what it returns.

use serde::Serialize;
use strum::Display;
use tracing::{debug, info, warn};

use super::HeartbeatPolicy;
use crate::market::Venue;

/// Lifecycle state of one venue connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// No transport.
    Disconnected,
    /// Handshake in flight.
    Connecting,
    /// Open, no heartbeat verdict yet.
    Connected,
    /// Liveness seen within the warn window.
    HeartbeatOk,
    /// No liveness within the warn window.
    HeartbeatLate,
}

impl ConnectionState {
    /// Whether frames can be written.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::HeartbeatOk | ConnectionState::HeartbeatLate
        )
    }
}

/// What the transport should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a probe.
    Probe,
    /// Tear the connection down.
    Reconnect {
        /// Consecutive probes that went unanswered.
        missed: u32,
    },
}

/// State machine of one venue connection.
#[derive(Debug)]
pub struct ConnectionMachine {
    venue: Venue,
    policy: HeartbeatPolicy,
    state: ConnectionState,
    last_liveness_ms: i64,
    probe_outstanding: bool,
    missed: u32,
    attempts: u32,
}

impl ConnectionMachine {
    /// Create a disconnected machine.
    pub fn new(venue: Venue, policy: HeartbeatPolicy) -> Self {
        Self {
            venue,
            policy,
            state: ConnectionState::Disconnected,
            last_liveness_ms: 0,
            probe_outstanding: false,
            missed: 0,
            attempts: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Failed connection attempts since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consecutive unanswered probes.
    pub fn missed(&self) -> u32 {
        self.missed
    }

    /// A connect attempt starts.
    pub fn connecting(&mut self) {
        self.transition(ConnectionState::Connecting);
    }

    /// The handshake succeeded.
    pub fn connected(&mut self, now_ms: i64) {
        self.attempts = 0;
        self.missed = 0;
        self.probe_outstanding = false;
        self.last_liveness_ms = now_ms;
        self.transition(ConnectionState::Connected);
    }

    /// The transport is gone, for whatever reason. Returns the attempt number
    /// the next reconnect will use.
    pub fn disconnected(&mut self, reason: &str) -> u32 {
        if self.state != ConnectionState::Disconnected {
            warn!(venue = %self.venue, reason, "Connection lost");
        }
        self.probe_outstanding = false;
        self.transition(ConnectionState::Disconnected);
        let attempt = self.attempts;
        self.attempts = self.attempts.saturating_add(1);
        attempt
    }

    /// Any inbound frame proves the peer is alive.
    pub fn on_liveness(&mut self, now_ms: i64) {
        self.last_liveness_ms = now_ms;
        self.probe_outstanding = false;
        self.missed = 0;
        if self.state.is_open() {
            self.transition(ConnectionState::HeartbeatOk);
        }
    }

    /// Evaluate liveness at a heartbeat tick.
    pub fn on_heartbeat_tick(&mut self, now_ms: i64) -> HeartbeatAction {
        if self.probe_outstanding {
            self.missed += 1;
        }
        if self.missed >= self.policy.reconnect_after_consecutive {
            let missed = self.missed;
            warn!(venue = %self.venue, missed, "Heartbeat missed too often, reconnecting");
            self.probe_outstanding = false;
            self.transition(ConnectionState::Disconnected);
            return HeartbeatAction::Reconnect { missed };
        }

        let silent_ms = now_ms - self.last_liveness_ms;
        if silent_ms >= self.policy.warn_after_ms as i64 && self.state != ConnectionState::HeartbeatLate {
            warn!(venue = %self.venue, silent_ms, missed = self.missed, "Heartbeat late");
            self.transition(ConnectionState::HeartbeatLate);
        }
        self.probe_outstanding = true;
        HeartbeatAction::Probe
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        match next {
            ConnectionState::Connected => info!(venue = %self.venue, "Connected"),
            ConnectionState::HeartbeatOk if self.state == ConnectionState::HeartbeatLate => {
                info!(venue = %self.venue, "Heartbeat recovered")
            }
            _ => debug!(venue = %self.venue, from = %self.state, to = %next, "Connection state"),
        }
        self.state = next;
    }
}
