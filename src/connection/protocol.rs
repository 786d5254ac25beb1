//! Venue subscribe, unsubscribe and heartbeat frames.

use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::market::Venue;

const KALSHI_CHANNELS: [&str; 3] = ["orderbook_delta", "ticker", "trade"];
const OPINION_CHANNELS: [&str; 3] = ["market.depth", "market.price", "market.trade"];

/// Frame builder for one connection.
///
/// Kalshi unsubscribes by subscription id, so the ids acknowledged on the
/// current connection are remembered here.
#[derive(Debug)]
pub struct VenueProtocol {
    venue: Venue,
    next_id: u64,
    kalshi_sids: Vec<u64>,
}

impl VenueProtocol {
    /// Create a builder for `venue`.
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            next_id: 1,
            kalshi_sids: Vec::new(),
        }
    }

    /// Reset per-connection state.
    pub fn reset(&mut self) {
        self.next_id = 1;
        self.kalshi_sids.clear();
    }

    /// Subscribe frames for one chunk. `initial` marks the first frame on a
    /// fresh connection.
    pub fn subscribe(&mut self, ids: &[String], initial: bool) -> Vec<Message> {
        match self.venue {
            Venue::Polymarket if initial => {
                vec![text(json!({"type": "market", "assets_ids": ids}))]
            }
            Venue::Polymarket => {
                vec![text(json!({"assets_ids": ids, "operation": "subscribe"}))]
            }
            Venue::Kalshi => {
                let id = self.take_id();
                vec![text(json!({
                    "id": id,
                    "cmd": "subscribe",
                    "params": {"channels": KALSHI_CHANNELS, "market_tickers": ids},
                }))]
            }
            Venue::Opinion => OPINION_CHANNELS
                .iter()
                .map(|channel| {
                    text(json!({"action": "SUBSCRIBE", "channel": channel, "marketIds": ids}))
                })
                .collect(),
        }
    }

    /// Unsubscribe frames for one chunk.
    pub fn unsubscribe(&mut self, ids: &[String]) -> Vec<Message> {
        match self.venue {
            Venue::Polymarket => {
                vec![text(json!({"assets_ids": ids, "operation": "unsubscribe"}))]
            }
            Venue::Kalshi if self.kalshi_sids.is_empty() => {
                debug!(count = ids.len(), "No Kalshi subscription ids yet, unsubscribe skipped");
                Vec::new()
            }
            Venue::Kalshi => {
                let id = self.take_id();
                vec![text(json!({
                    "id": id,
                    "cmd": "update_subscription",
                    "params": {
                        "sids": self.kalshi_sids,
                        "market_tickers": ids,
                        "action": "delete_markets",
                    },
                }))]
            }
            Venue::Opinion => OPINION_CHANNELS
                .iter()
                .map(|channel| {
                    text(json!({"action": "UNSUBSCRIBE", "channel": channel, "marketIds": ids}))
                })
                .collect(),
        }
    }

    /// Heartbeat probe.
    pub fn probe(&self) -> Message {
        match self.venue {
            Venue::Polymarket => Message::Text("PING".to_string()),
            Venue::Kalshi => Message::Ping(Vec::new()),
            Venue::Opinion => text(json!({"action": "HEARTBEAT"})),
        }
    }

    /// Consume protocol-level text frames (heartbeat replies, subscription
    /// acks). Returns `true` when the frame carries no market data.
    pub fn handle_control(&mut self, frame: &str) -> bool {
        let trimmed = frame.trim();
        if trimmed.eq_ignore_ascii_case("pong") || trimmed.eq_ignore_ascii_case("ping") {
            return true;
        }
        let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
            return false;
        };

        match self.venue {
            Venue::Polymarket => false,
            Venue::Kalshi => match value.get("type").and_then(Value::as_str) {
                Some("subscribed") => {
                    if let Some(sid) = value.pointer("/msg/sid").and_then(Value::as_u64) {
                        if !self.kalshi_sids.contains(&sid) {
                            self.kalshi_sids.push(sid);
                        }
                    }
                    true
                }
                Some("error") => {
                    debug!(frame = trimmed, "Kalshi command rejected");
                    true
                }
                Some("ok" | "unsubscribed") => true,
                _ => false,
            },
            Venue::Opinion => {
                let action = value.get("action").and_then(Value::as_str);
                let code = value.get("code").is_some() && value.get("channel").is_none();
                matches!(action, Some("HEARTBEAT" | "SUBSCRIBE" | "UNSUBSCRIBE")) || code
            }
        }
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn text(value: Value) -> Message {
    Message::Text(value.to_string())
}
