//! Health check endpoint: for load balancers, monitoring, and Docker health checks.

use std::{sync::Arc, time::Instant};

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    server_name: String,
    uptime_secs: u64,
}

/// Health check router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health_check))
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_ok = haven_db::postgres::health_check(&state.db.pg).await;

    Json(HealthResponse {
        status: if db_ok { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        server_name: state.server_name.to_string(),
        uptime_secs: Instant::now().duration_since(state.started_at).as_secs(),
    })
}
