//! Operational HTTP API: health, readiness, engine status, detector stats,
//! alert history and Prometheus metrics.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
