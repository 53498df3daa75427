//! # Application State
//!
//! Shared state for the telemetry server's Axum application: the hub
//! actor handle, this node's own identity for the health endpoint, and
//! its start time for uptime reporting. `ready`/`degraded` back the
//! health endpoint's status field (§6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use meshnode_core::{NodeId, Timestamp};

use crate::hub::TelemetryHub;

/// Shared application state passed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: TelemetryHub,
    pub node_id: NodeId,
    pub started_at: Timestamp,
    ready: Arc<AtomicBool>,
    degraded: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            hub: TelemetryHub::spawn(),
            node_id,
            started_at: Timestamp::now(),
            ready: Arc::new(AtomicBool::new(false)),
            degraded: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark startup complete: the BTP listener and peer dials are live.
    /// Before this, `/api/health` reports `starting`.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark persistence as running on its in-memory fallback rather
    /// than a live database. While set, `/api/health` reports
    /// `degraded` instead of `ready`.
    pub fn mark_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }
}
