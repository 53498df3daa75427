//! # Payment Handler Adapter
//!
//! Translates transport-level Prepare/Fulfill/Reject packets into a
//! narrow business-level request/response shape, and back. The
//! business layer never sees `executionCondition` or the upstream
//! peer, so it cannot forge cryptographic proofs or make routing
//! decisions (§4.4).

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use meshnode_core::{generate_packet_id, reject_from_here, Address, ErrorCode, Fulfill, NodeId, PacketId, Reject, Timestamp};
use meshnode_crypto::sha256_bytes;

const MAX_RESPONSE_DATA_BYTES: usize = 32_768;

/// What the forwarding engine exposes to the business layer: everything
/// needed to decide accept/reject, nothing that would let it forge a
/// fulfillment or pick a route.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub payment_id: PacketId,
    pub destination: Address,
    pub amount: u64,
    pub expires_at: Timestamp,
    pub data: Vec<u8>,
}

/// Business-level reject reason, mapped to a wire `ErrorCode` by
/// `map_reject_reason`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    InsufficientFunds,
    Expired,
    InvalidRequest,
    InvalidAmount,
    UnexpectedPayment,
    ApplicationError,
    InternalError,
    Timeout,
    /// A sliding-window rate limit was exhausted for `operation`, whose
    /// configured per-hour cap is `limit` (§7).
    RateLimitExceeded { operation: String, limit: u32 },
    Unknown(String),
}

/// Maps a business reject reason to its wire `ErrorCode` (§4.4's table).
/// Unknown keys map to `F99`.
pub fn map_reject_reason(reason: &RejectReason) -> ErrorCode {
    match reason {
        RejectReason::InsufficientFunds => ErrorCode::T04,
        RejectReason::Expired => ErrorCode::R00,
        RejectReason::InvalidRequest => ErrorCode::F00,
        RejectReason::InvalidAmount => ErrorCode::F03,
        RejectReason::UnexpectedPayment => ErrorCode::F06,
        RejectReason::ApplicationError => ErrorCode::F99,
        RejectReason::InternalError => ErrorCode::T00,
        RejectReason::Timeout => ErrorCode::T00,
        RejectReason::RateLimitExceeded { .. } => ErrorCode::F99,
        RejectReason::Unknown(_) => ErrorCode::F99,
    }
}

/// What the handler returns: accept with optional base64url response
/// data, or reject with an optional reason and response data.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    Accept { data: Option<String> },
    Reject { reason: Option<RejectReason>, data: Option<String> },
}

/// An opaque business-layer failure — "the handler threw" in §4.4's
/// terms. Always maps to `T00`.
#[derive(Debug, Clone)]
pub struct HandlerError(pub String);

/// The business-layer callback. `async-trait` stands in for native
/// async-fn-in-trait so the adapter can hold a boxed handler behind a
/// single object-safe interface.
#[async_trait]
pub trait PaymentHandler: Send + Sync {
    async fn handle(&self, request: PaymentRequest) -> Result<HandlerOutcome, HandlerError>;
}

/// Translates a Prepare (already routed to a local-terminating prefix)
/// into a handler call, and the handler's outcome back into a
/// Fulfill/Reject sharing the Prepare's packet id.
pub struct PaymentHandlerAdapter<H: PaymentHandler> {
    here: NodeId,
    handler: H,
}

/// Outcome of dispatching a Prepare to the local payment handler.
pub enum DispatchOutcome {
    Fulfill(Fulfill),
    Reject(Reject),
}

impl<H: PaymentHandler> PaymentHandlerAdapter<H> {
    pub fn new(here: NodeId, handler: H) -> Self {
        Self { here, handler }
    }

    /// Run the full translation pipeline for one inbound Prepare.
    pub async fn dispatch(
        &self,
        payment_id: PacketId,
        destination: Address,
        amount: u64,
        expires_at: Timestamp,
        data: Vec<u8>,
    ) -> DispatchOutcome {
        if Timestamp::now().is_at_or_after(&expires_at) {
            return DispatchOutcome::Reject(reject_from_here(
                payment_id,
                ErrorCode::R00,
                "Payment has expired",
                &self.here,
            ));
        }

        let request = PaymentRequest {
            payment_id,
            destination,
            amount,
            expires_at,
            data,
        };

        match self.handler.handle(request).await {
            Ok(HandlerOutcome::Accept { data }) => {
                let response_data = validate_response_data(data);
                let preimage = response_data.clone().unwrap_or_default();
                DispatchOutcome::Fulfill(Fulfill {
                    id: payment_id,
                    fulfillment: sha256_bytes(&preimage),
                    data: preimage,
                })
            }
            Ok(HandlerOutcome::Reject { reason, data }) => {
                let response_data = validate_response_data(data).unwrap_or_default();
                let code = reason.as_ref().map(map_reject_reason).unwrap_or(ErrorCode::F99);
                let message = match &reason {
                    Some(r) => describe_reason(r),
                    None => "Payment rejected".to_string(),
                };
                DispatchOutcome::Reject(Reject {
                    id: payment_id,
                    code,
                    message,
                    triggered_by: self.here.clone(),
                    data: response_data,
                })
            }
            Err(_err) => DispatchOutcome::Reject(reject_from_here(
                payment_id,
                ErrorCode::T00,
                "Internal error processing payment",
                &self.here,
            )),
        }
    }
}

fn describe_reason(reason: &RejectReason) -> String {
    match reason {
        RejectReason::InsufficientFunds => "Insufficient funds".to_string(),
        RejectReason::Expired => "Payment has expired".to_string(),
        RejectReason::InvalidRequest => "Invalid request".to_string(),
        RejectReason::InvalidAmount => "Invalid amount".to_string(),
        RejectReason::UnexpectedPayment => "Unexpected payment".to_string(),
        RejectReason::ApplicationError => "Application error".to_string(),
        RejectReason::InternalError => "Internal error".to_string(),
        RejectReason::Timeout => "Timed out".to_string(),
        RejectReason::RateLimitExceeded { operation, limit } => {
            format!("Rate limit exceeded for {operation} ({limit}/h)")
        }
        RejectReason::Unknown(key) => format!("Payment rejected ({key})"),
    }
}

/// Decode and size-validate handler response data. Invalid base64url or
/// data exceeding 32768 bytes after decode is stripped to `None` with a
/// warning, per §4.4.
fn validate_response_data(data: Option<String>) -> Option<Vec<u8>> {
    let data = data?;
    match URL_SAFE_NO_PAD.decode(data.as_bytes()) {
        Ok(bytes) if bytes.len() <= MAX_RESPONSE_DATA_BYTES => Some(bytes),
        Ok(bytes) => {
            tracing::warn!(len = bytes.len(), "response data exceeds 32768 bytes, stripping");
            None
        }
        Err(err) => {
            tracing::warn!(%err, "response data is not valid base64url, stripping");
            None
        }
    }
}
