//! # Sliding-Window Rate Limiter
//!
//! Per `(operation, identifier)` key, an ordered set of event instants
//! within the last hour. `checkRateLimit` prunes expired instants before
//! comparing against the operation's limit.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

const WINDOW: Duration = Duration::from_secs(3600);
const DEFAULT_LIMIT: u32 = 100;

/// The configured per-hour cap for `operation`, for callers that need to
/// report it alongside a rate-limit rejection.
pub fn limit_for(operation: &str) -> u32 {
    match operation {
        "wallet_creation" => 100,
        "funding_request" => 50,
        _ => DEFAULT_LIMIT,
    }
}

/// Sliding-window operation counter keyed by `(operation, identifier)`.
#[derive(Default)]
pub struct RateLimiter {
    windows: RwLock<HashMap<(String, String), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prune instants older than one hour, then admit iff the remaining
    /// count is below the operation's limit.
    pub async fn check_rate_limit(&self, operation: &str, identifier: &str) -> bool {
        let now = Instant::now();
        let limit = limit_for(operation);
        let mut windows = self.windows.write().await;
        let entry = windows
            .entry((operation.to_string(), identifier.to_string()))
            .or_default();
        entry.retain(|instant| now.duration_since(*instant) < WINDOW);

        if entry.len() as u32 >= limit {
            false
        } else {
            entry.push(now);
            true
        }
    }

    /// Append without checking the limit.
    pub async fn record_operation(&self, operation: &str, identifier: &str) {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        windows
            .entry((operation.to_string(), identifier.to_string()))
            .or_default()
            .push(now);
    }

    /// Current window size for a key, after pruning.
    pub async fn get_operation_count(&self, operation: &str, identifier: &str) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let entry = windows
            .entry((operation.to_string(), identifier.to_string()))
            .or_default();
        entry.retain(|instant| now.duration_since(*instant) < WINDOW);
        entry.len()
    }

    /// Drop keys with an empty window. Intended to run every ten minutes.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        windows.retain(|_, instants| {
            instants.retain(|instant| now.duration_since(*instant) < WINDOW);
            !instants.is_empty()
        });
    }
}
