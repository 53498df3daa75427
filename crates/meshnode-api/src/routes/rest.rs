//! # Dashboard Hydration Routes
//!
//! `GET /api/balances` and `GET /api/settlements`, backing initial
//! dashboard load before the WebSocket stream takes over (§4.9, §6).

use axum::extract::State;
use axum::Json;

use crate::hub::BalanceState;
use crate::state::AppState;
use meshnode_telemetry::TelemetryMessage;

pub async fn balances(State(state): State<AppState>) -> Json<Vec<BalanceState>> {
    Json(state.hub.balances().await)
}

pub async fn settlements(State(state): State<AppState>) -> Json<Vec<TelemetryMessage>> {
    Json(state.hub.settlements().await)
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/api/balances", axum::routing::get(balances))
        .route("/api/settlements", axum::routing::get(settlements))
}
