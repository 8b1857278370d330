//! HTTP exposition for the accumulator.
//!
//! Three routes, which together are the wire surface the controller's
//! probe speaks: the report, the window reset, and a liveness check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::debug;

use crate::accumulator::{MetricsAccumulator, MetricsReport};

/// Build the exposition router over one accumulator.
pub fn build_router(accumulator: MetricsAccumulator) -> Router {
    Router::new()
        .route("/metrics", get(get_metrics))
        .route("/metrics/reset", post(reset_metrics))
        .route("/healthz", get(healthz))
        .with_state(accumulator)
}

/// GET /metrics
async fn get_metrics(State(acc): State<MetricsAccumulator>) -> Json<MetricsReport> {
    Json(acc.snapshot().await)
}

/// POST /metrics/reset
async fn reset_metrics(State(acc): State<MetricsAccumulator>) -> StatusCode {
    acc.reset().await;
    debug!("metrics window reset");
    StatusCode::NO_CONTENT
}

/// GET /healthz
async fn healthz() -> &'static str {
    "ok"
}
