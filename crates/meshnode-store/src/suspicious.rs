//! # Suspicious-Activity Detector
//!
//! Per-agent rapid-funding and outlier-amount detection over in-memory
//! history. Not persisted — a restart clears accumulated history, which
//! is acceptable since the detector is advisory, not an audit record.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use meshnode_core::{AgentId, TokenId};

const RAPID_FUNDING_WINDOW: Duration = Duration::from_secs(3600);
const DEFAULT_RAPID_FUNDING_THRESHOLD: usize = 5;
const MIN_SAMPLES_FOR_OUTLIER_CHECK: usize = 10;
const DEFAULT_OUTLIER_K: f64 = 3.0;

#[derive(Default)]
struct AgentHistory {
    funding_requests: Vec<Instant>,
    transactions: HashMap<TokenId, Vec<u64>>,
}

/// Detects rapid funding requests and statistically unusual transaction
/// amounts per agent.
pub struct SuspiciousActivityDetector {
    rapid_funding_threshold: usize,
    outlier_k: f64,
    history: RwLock<HashMap<AgentId, AgentHistory>>,
}

impl Default for SuspiciousActivityDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl SuspiciousActivityDetector {
    pub fn new() -> Self {
        Self {
            rapid_funding_threshold: DEFAULT_RAPID_FUNDING_THRESHOLD,
            outlier_k: DEFAULT_OUTLIER_K,
            history: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_thresholds(rapid_funding_threshold: usize, outlier_k: f64) -> Self {
        Self {
            rapid_funding_threshold,
            outlier_k,
            history: RwLock::new(HashMap::new()),
        }
    }

    pub async fn record_funding_request(&self, agent: &AgentId) {
        let now = Instant::now();
        let mut history = self.history.write().await;
        history.entry(agent.clone()).or_default().funding_requests.push(now);
    }

    pub async fn record_transaction(&self, agent: &AgentId, amount: u64, token: &TokenId) {
        let mut history = self.history.write().await;
        history
            .entry(agent.clone())
            .or_default()
            .transactions
            .entry(token.clone())
            .or_default()
            .push(amount);
    }

    /// True iff funding requests in the last hour reach the threshold.
    pub async fn detect_rapid_funding(&self, agent: &AgentId) -> bool {
        let now = Instant::now();
        let history = self.history.read().await;
        let Some(entry) = history.get(agent) else {
            return false;
        };
        let recent = entry
            .funding_requests
            .iter()
            .filter(|instant| now.duration_since(**instant) < RAPID_FUNDING_WINDOW)
            .count();
        recent >= self.rapid_funding_threshold
    }

    /// True iff `amount` is a statistical outlier against the agent's
    /// prior same-token transaction history, or the token has never
    /// been seen for this agent. False when fewer than 10 samples exist.
    pub async fn detect_unusual_transactions(&self, agent: &AgentId, amount: u64, token: &TokenId) -> bool {
        let history = self.history.read().await;
        let Some(entry) = history.get(agent) else {
            return true;
        };
        let Some(samples) = entry.transactions.get(token) else {
            return true;
        };
        if samples.len() < MIN_SAMPLES_FOR_OUTLIER_CHECK {
            return false;
        }
        let mean = samples.iter().sum::<u64>() as f64 / samples.len() as f64;
        let variance = samples
            .iter()
            .map(|&x| {
                let diff = x as f64 - mean;
                diff * diff
            })
            .sum::<f64>()
            / samples.len() as f64;
        let std_dev = variance.sqrt();
        (amount as f64 - mean).abs() > self.outlier_k * std_dev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rapid_funding_triggers_at_threshold() {
        let detector = SuspiciousActivityDetector::new();
        let agent = AgentId::new("agent-1");
        for _ in 0..4 {
            detector.record_funding_request(&agent).await;
        }
        assert!(!detector.detect_rapid_funding(&agent).await);
        detector.record_funding_request(&agent).await;
        assert!(detector.detect_rapid_funding(&agent).await);
    }

    #[tokio::test]
    async fn unseen_agent_has_no_rapid_funding() {
        let detector = SuspiciousActivityDetector::new();
        assert!(!detector.detect_rapid_funding(&AgentId::new("ghost")).await);
    }

    #[tokio::test]
    async fn unseen_token_is_treated_as_unusual() {
        let detector = SuspiciousActivityDetector::new();
        let agent = AgentId::new("agent-1");
        let token = TokenId::new("usd");
        assert!(detector.detect_unusual_transactions(&agent, 100, &token).await);
    }

    #[tokio::test]
    async fn fewer_than_ten_samples_never_flags_as_unusual() {
        let detector = SuspiciousActivityDetector::new();
        let agent = AgentId::new("agent-1");
        let token = TokenId::new("usd");
        for _ in 0..9 {
            detector.record_transaction(&agent, 100, &token).await;
        }
        assert!(!detector.detect_unusual_transactions(&agent, 1_000_000, &token).await);
    }

    #[tokio::test]
    async fn outlier_beyond_k_sigma_is_flagged() {
        let detector = SuspiciousActivityDetector::new();
        let agent = AgentId::new("agent-1");
        let token = TokenId::new("usd");
        for _ in 0..10 {
            detector.record_transaction(&agent, 100, &token).await;
        }
        // All prior samples identical (std_dev = 0): any deviation is an outlier.
        assert!(detector.detect_unusual_transactions(&agent, 101, &token).await);
        assert!(!detector.detect_unusual_transactions(&agent, 100, &token).await);
    }
}
