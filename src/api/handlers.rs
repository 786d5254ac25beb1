//! HTTP API handlers.
//!
//! Handlers only read snapshots the dispatch loop publishes into
//! [`AppState`]; they never reach into engine state.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::connection::ConnectionState;
use crate::detector::{DetectorStats, Signal, SignalKind};
use crate::engine::{Engine, EngineStatus};
use crate::market::Venue;

/// Default number of alerts returned by the history endpoint.
const DEFAULT_ALERT_LIMIT: usize = 20;

struct Shared {
    started: Instant,
    connections: DashMap<Venue, ConnectionState>,
    detectors: DashMap<SignalKind, DetectorStats>,
    alerts: DashMap<SignalKind, Vec<Signal>>,
    engine: RwLock<Option<EngineStatus>>,
    prometheus: Option<PrometheusHandle>,
}

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

impl AppState {
    /// Create empty state. Without a Prometheus handle `/metrics` is 404.
    pub fn new(prometheus: Option<PrometheusHandle>) -> Self {
        Self {
            inner: Arc::new(Shared {
                started: Instant::now(),
                connections: DashMap::new(),
                detectors: DashMap::new(),
                alerts: DashMap::new(),
                engine: RwLock::new(None),
                prometheus,
            }),
        }
    }

    /// Record a venue connection state.
    pub fn set_connection(&self, venue: Venue, state: ConnectionState) {
        self.inner.connections.insert(venue, state);
    }

    /// Whether at least one venue connection is open.
    pub fn is_ready(&self) -> bool {
        self.inner.connections.iter().any(|entry| entry.value().is_open())
    }

    /// Copy the engine's status and detector stats.
    pub async fn publish(&self, engine: &Engine, now_ms: i64) {
        let status = engine.status(now_ms);
        for (venue, state) in &status.connections {
            self.inner.connections.insert(*venue, *state);
        }
        for (kind, stats) in engine.stats() {
            self.inner.detectors.insert(kind, stats);
        }
        *self.inner.engine.write().await = Some(status);
    }

    /// Replace the published alert history of one detector.
    pub fn publish_alerts(&self, kind: SignalKind, alerts: Vec<Signal>) {
        self.inner.alerts.insert(kind, alerts);
    }

    fn uptime_secs(&self) -> u64 {
        self.inner.started.elapsed().as_secs()
    }

    fn connections(&self) -> BTreeMap<Venue, ConnectionState> {
        self.inner
            .connections
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether any venue connection is open.
    pub ready: bool,
    /// Connection state per venue.
    pub connections: BTreeMap<Venue, ConnectionState>,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// "running" once ready, "starting" before.
    pub status: &'static str,
    /// Seconds since startup.
    pub uptime_secs: u64,
    /// Connection state per venue.
    pub connections: BTreeMap<Venue, ConnectionState>,
    /// Last published engine summary.
    pub engine: Option<EngineStatus>,
}

/// Query of the alert history endpoint.
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Maximum alerts returned, newest first.
    pub limit: Option<usize>,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - 200 once a venue connection is open, 503 before.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let response = ReadyResponse {
        ready: state.is_ready(),
        connections: state.connections(),
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - connection states, cache size and uptime.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.inner.engine.read().await.clone();
    Json(StatusResponse {
        status: if state.is_ready() { "running" } else { "starting" },
        uptime_secs: state.uptime_secs(),
        connections: state.connections(),
        engine,
    })
}

/// Detector stats handler.
pub async fn detectors(State(state): State<AppState>) -> impl IntoResponse {
    let stats: BTreeMap<SignalKind, DetectorStats> = state
        .inner
        .detectors
        .iter()
        .map(|entry| (*entry.key(), entry.value().clone()))
        .collect();
    Json(stats)
}

/// Alert history handler for one detector.
pub async fn alerts(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<AlertQuery>,
) -> Response {
    let Ok(kind) = SignalKind::from_str(&kind) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown detector {kind}"),
            }),
        )
            .into_response();
    };
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    let alerts: Vec<Signal> = state
        .inner
        .alerts
        .get(&kind)
        .map(|entry| entry.value().iter().take(limit).cloned().collect())
        .unwrap_or_default();
    Json(alerts).into_response()
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.inner.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_follows_open_connections() {
        let state = AppState::new(None);
        assert!(!state.is_ready());

        state.set_connection(Venue::Kalshi, ConnectionState::Connecting);
        assert!(!state.is_ready());

        state.set_connection(Venue::Polymarket, ConnectionState::HeartbeatLate);
        assert!(state.is_ready());

        state.set_connection(Venue::Polymarket, ConnectionState::Disconnected);
        assert!(!state.is_ready());
    }
}
