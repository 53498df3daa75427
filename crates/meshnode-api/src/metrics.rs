//! # Prometheus Metrics Endpoint
//!
//! `GET /metrics` — scrape target for the node's Prometheus exporter,
//! installed once at startup and shared across the process (§14).

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusHandle, PrometheusBuilder};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Safe to call once per
/// process; subsequent calls reuse the already-installed handle.
pub fn install() -> PrometheusHandle {
    HANDLE
        .get_or_init(|| PrometheusBuilder::new().install_recorder().expect("failed to install prometheus recorder"))
        .clone()
}

pub async fn scrape() -> String {
    install().render()
}

pub fn router<S: Clone + Send + Sync + 'static>() -> axum::Router<S> {
    axum::Router::new().route("/metrics", axum::routing::get(scrape))
}
