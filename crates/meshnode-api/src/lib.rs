//! # meshnode-api — Telemetry Server
//!
//! The dashboard-facing half of the telemetry pipeline (§4.9, §2.13): a
//! single WebSocket endpoint serving both connector and dashboard-client
//! roles, a REST surface for initial hydration, and an unauthenticated
//! health probe.
//!
//! ## Architecture
//!
//! All server-side telemetry state (status cache, balance map,
//! settlement-events ring, client set) lives behind the `TelemetryHub`
//! actor in `hub.rs`; route handlers only ever send it commands.
//!
//! ## Crate Policy
//!
//! - Depends on `meshnode-core` and `meshnode-telemetry`.
//! - No business logic in route handlers — delegates to `TelemetryHub`.

pub mod hub;
pub mod metrics;
pub mod routes;
pub mod state;

pub use hub::{BalanceState, TelemetryHub};
pub use state::AppState;

pub fn router(state: AppState) -> axum::Router {
    routes::assemble()
        .merge(metrics::router())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
