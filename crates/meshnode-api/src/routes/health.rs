//! # Health Endpoint
//!
//! `GET /api/health` — unauthenticated, per §6's REST surface.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use meshnode_core::Timestamp;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ready,
    Starting,
    Degraded,
}

#[derive(Serialize)]
pub struct HealthResponse {
    node_id: String,
    uptime: i64,
    status: HealthStatus,
    timestamp: Timestamp,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Timestamp::now().as_datetime().signed_duration_since(*state.started_at.as_datetime()).num_seconds();
    let status = if !state.is_ready() {
        HealthStatus::Starting
    } else if state.is_degraded() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ready
    };
    Json(HealthResponse {
        node_id: state.node_id.as_str().to_string(),
        uptime,
        status,
        timestamp: Timestamp::now(),
    })
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/api/health", axum::routing::get(health))
}
