//! # Wallet-Backed Payment Handler
//!
//! The connector's default business layer for locally-terminating
//! Prepares: wallet creation, funding requests, and plain payments, each
//! routed through the rate limiter, the suspicious-activity detector,
//! and the audit log before the forwarding engine's adapter turns the
//! outcome back into a Fulfill or Reject (§4.4, §2.2-2.5).
//!
//! A Prepare's `data` carries an optional JSON envelope
//! `{"op": "wallet_creation" | "funding_request", "agentId": "...", ...}`.
//! Data that isn't a recognized envelope is treated as a plain payment
//! against the destination's final address segment as the acting agent.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use meshnode_core::AgentId;
use meshnode_forwarding::{HandlerError, HandlerOutcome, PaymentHandler, PaymentRequest, RejectReason};
use meshnode_store::{AuditLogger, AuditResult, RateLimiter, SuspiciousActivityDetector, WalletMetadata, WalletStore};

pub struct WalletPaymentHandler {
    token: meshnode_core::TokenId,
    wallets: Arc<WalletStore>,
    rate_limiter: Arc<RateLimiter>,
    suspicious: Arc<SuspiciousActivityDetector>,
    audit: Arc<AuditLogger>,
    next_derivation_index: AtomicI64,
}

impl WalletPaymentHandler {
    pub fn new(
        token: meshnode_core::TokenId,
        wallets: Arc<WalletStore>,
        rate_limiter: Arc<RateLimiter>,
        suspicious: Arc<SuspiciousActivityDetector>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            token,
            wallets,
            rate_limiter,
            suspicious,
            audit,
            next_derivation_index: AtomicI64::new(0),
        }
    }

    fn agent_from(value: Option<&serde_json::Value>, fallback: &str) -> AgentId {
        let id = value.and_then(|v| v.get("agentId")).and_then(|v| v.as_str()).unwrap_or(fallback);
        AgentId::new(id)
    }

    async fn handle_wallet_creation(&self, agent: AgentId, envelope: serde_json::Value) -> HandlerOutcome {
        if !self.rate_limiter.check_rate_limit("wallet_creation", agent.as_str()).await {
            let _ = self
                .audit
                .audit_log("wallet_creation", &agent, serde_json::json!({"reason": "rate_limited"}), AuditResult::Failure, None, None)
                .await;
            let reason = RejectReason::RateLimitExceeded {
                operation: "wallet_creation".to_string(),
                limit: meshnode_store::limit_for("wallet_creation"),
            };
            return HandlerOutcome::Reject { reason: Some(reason), data: None };
        }

        let index = self.next_derivation_index.fetch_add(1, Ordering::SeqCst);
        let wallet = WalletMetadata {
            agent_id: agent.as_str().to_string(),
            derivation_index: index,
            evm_address: envelope.get("evmAddress").and_then(|v| v.as_str()).map(String::from),
            xrp_address: envelope.get("xrpAddress").and_then(|v| v.as_str()).map(String::from),
            created_at: Utc::now(),
            metadata_json: envelope,
        };

        match self.wallets.insert_wallet(wallet).await {
            Ok(()) => {
                let _ = self
                    .audit
                    .audit_log("wallet_creation", &agent, serde_json::json!({"derivationIndex": index}), AuditResult::Success, None, None)
                    .await;
                HandlerOutcome::Accept { data: None }
            }
            Err(err) => {
                let _ = self
                    .audit
                    .audit_log("wallet_creation", &agent, serde_json::json!({"error": err.to_string()}), AuditResult::Failure, None, None)
                    .await;
                HandlerOutcome::Reject { reason: Some(RejectReason::InternalError), data: None }
            }
        }
    }

    async fn handle_funding_request(&self, agent: AgentId) -> HandlerOutcome {
        if !self.rate_limiter.check_rate_limit("funding_request", agent.as_str()).await {
            let _ = self
                .audit
                .audit_log("funding_request", &agent, serde_json::json!({"reason": "rate_limited"}), AuditResult::Failure, None, None)
                .await;
            let reason = RejectReason::RateLimitExceeded {
                operation: "funding_request".to_string(),
                limit: meshnode_store::limit_for("funding_request"),
            };
            return HandlerOutcome::Reject { reason: Some(reason), data: None };
        }

        self.suspicious.record_funding_request(&agent).await;
        if self.suspicious.detect_rapid_funding(&agent).await {
            let _ = self
                .audit
                .audit_log("funding_request", &agent, serde_json::json!({"reason": "rapid_funding"}), AuditResult::Failure, None, None)
                .await;
            return HandlerOutcome::Reject { reason: Some(RejectReason::ApplicationError), data: None };
        }

        let _ = self.audit.audit_log("funding_request", &agent, serde_json::json!({}), AuditResult::Success, None, None).await;
        HandlerOutcome::Accept { data: None }
    }

    async fn handle_payment(&self, agent: AgentId, amount: u64) -> HandlerOutcome {
        if self.suspicious.detect_unusual_transactions(&agent, amount, &self.token).await {
            let _ = self
                .audit
                .audit_log("payment", &agent, serde_json::json!({"reason": "unusual_amount", "amount": amount}), AuditResult::Failure, None, None)
                .await;
            return HandlerOutcome::Reject { reason: Some(RejectReason::ApplicationError), data: None };
        }

        self.suspicious.record_transaction(&agent, amount, &self.token).await;
        let _ = self.audit.audit_log("payment", &agent, serde_json::json!({"amount": amount}), AuditResult::Success, None, None).await;
        HandlerOutcome::Accept { data: None }
    }
}

#[async_trait]
impl PaymentHandler for WalletPaymentHandler {
    async fn handle(&self, request: PaymentRequest) -> Result<HandlerOutcome, HandlerError> {
        let fallback = request.destination.segments().last().unwrap_or(request.destination.as_str());
        let envelope: Option<serde_json::Value> = serde_json::from_slice(&request.data).ok();
        let op = envelope.as_ref().and_then(|v| v.get("op")).and_then(|v| v.as_str());

        let outcome = match op {
            Some("wallet_creation") => {
                let agent = Self::agent_from(envelope.as_ref(), fallback);
                self.handle_wallet_creation(agent, envelope.unwrap_or_default()).await
            }
            Some("funding_request") => {
                let agent = Self::agent_from(envelope.as_ref(), fallback);
                self.handle_funding_request(agent).await
            }
            _ => {
                let agent = Self::agent_from(envelope.as_ref(), fallback);
                self.handle_payment(agent, request.amount).await
            }
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshnode_core::{Address, PacketId, Timestamp, TokenId};

    fn handler() -> WalletPaymentHandler {
        WalletPaymentHandler::new(
            TokenId::new("usd"),
            Arc::new(WalletStore::in_memory()),
            Arc::new(RateLimiter::new()),
            Arc::new(SuspiciousActivityDetector::new()),
            Arc::new(AuditLogger::in_memory()),
        )
    }

    fn request(data: Vec<u8>) -> PaymentRequest {
        PaymentRequest {
            payment_id: PacketId::from_bytes([1u8; 16]),
            destination: Address::parse("g.local.agent-1").unwrap(),
            amount: 100,
            expires_at: Timestamp::now().plus_seconds(30),
            data,
        }
    }

    #[tokio::test]
    async fn wallet_creation_accepts_then_rate_limits_at_101st() {
        let handler = handler();
        let envelope = serde_json::json!({"op": "wallet_creation", "agentId": "agent-x"}).to_string().into_bytes();
        for _ in 0..100 {
            let outcome = handler.handle(request(envelope.clone())).await.unwrap();
            assert!(matches!(outcome, HandlerOutcome::Accept { .. }));
        }
        let outcome = handler.handle(request(envelope)).await.unwrap();
        assert!(matches!(outcome, HandlerOutcome::Reject { .. }));
    }

    #[tokio::test]
    async fn rate_limited_wallet_creation_surfaces_operation_and_limit() {
        let handler = handler();
        let envelope = serde_json::json!({"op": "wallet_creation", "agentId": "agent-y"}).to_string().into_bytes();
        for _ in 0..100 {
            handler.handle(request(envelope.clone())).await.unwrap();
        }
        let outcome = handler.handle(request(envelope)).await.unwrap();
        match outcome {
            HandlerOutcome::Reject { reason: Some(RejectReason::RateLimitExceeded { operation, limit }), .. } => {
                assert_eq!(operation, "wallet_creation");
                assert_eq!(limit, 100);
            }
            other => panic!("expected RateLimitExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unrecognized_data_is_treated_as_a_plain_payment() {
        let handler = handler();
        let outcome = handler.handle(request(b"not json".to_vec())).await.unwrap();
        assert!(matches!(outcome, HandlerOutcome::Accept { .. }));
    }
}
