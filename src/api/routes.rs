//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{alerts, detectors, health, metrics, ready, status, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Engine endpoints
        .route("/api/v1/status", get(status))
        .route("/api/v1/detectors", get(detectors))
        .route("/api/v1/alerts/:kind", get(alerts))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::detector::{DetectorSettings, Signal, SignalDetails, SignalKind, Strength};
    use crate::engine::{Engine, EngineInput};
    use crate::governor::GovernorConfig;
    use crate::market::{MarketListing, MarketMeta, Venue};
    use crate::store::StoreConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    fn new_market_signal(id: u64) -> Signal {
        Signal {
            id,
            kind: SignalKind::NewMarket,
            venue: Venue::Kalshi,
            market_id: format!("KX{id}"),
            token_id: None,
            meta: MarketMeta::default(),
            strength: Strength::Low,
            timestamp_ms: id as i64,
            correlation_id: format!("new_market:kalshi:KX{id}"),
            details: SignalDetails::NewMarket {
                listing: MarketListing::new(Venue::Kalshi, format!("KX{id}")),
            },
        }
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (status, body) = get_json(create_router(AppState::new(None)), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn ready_endpoint_returns_503_until_a_connection_opens() {
        let state = AppState::new(None);
        let (status, _) = get_json(create_router(state.clone()), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.set_connection(Venue::Opinion, ConnectionState::Connected);
        let (status, body) = get_json(create_router(state), "/ready").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connections"]["opinion"], "connected");
    }

    #[tokio::test]
    async fn status_and_detectors_reflect_published_engine() {
        let state = AppState::new(None);
        let mut engine = Engine::new(
            StoreConfig::default(),
            GovernorConfig::default(),
            &DetectorSettings::default(),
            100,
        );
        engine.handle(
            EngineInput::Connection {
                venue: Venue::Kalshi,
                state: ConnectionState::HeartbeatOk,
            },
            0,
        );
        state.publish(&engine, 0).await;

        let (status, body) = get_json(create_router(state.clone()), "/api/v1/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["engine"]["cache_entries"], 0);
        assert_eq!(body["connections"]["kalshi"], "heartbeat_ok");

        let (status, body) = get_json(create_router(state), "/api/v1/detectors").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_object().map(|o| o.len()), Some(10));
        assert_eq!(body["arbitrage"]["emitted"], 0);
    }

    #[tokio::test]
    async fn alerts_endpoint_limits_and_rejects_unknown_kinds() {
        let state = AppState::new(None);
        state.publish_alerts(
            SignalKind::NewMarket,
            vec![new_market_signal(3), new_market_signal(2), new_market_signal(1)],
        );

        let (status, body) =
            get_json(create_router(state.clone()), "/api/v1/alerts/new_market?limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<u64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![3, 2]);

        let (status, body) = get_json(create_router(state.clone()), "/api/v1/alerts/skew").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Array(vec![]));

        let (status, _) = get_json(create_router(state), "/api/v1/alerts/moon").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let app = create_router(AppState::new(None));
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
