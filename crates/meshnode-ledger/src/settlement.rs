//! # Settlement Executor Adapter
//!
//! The off-path act of zeroing a bilateral balance is an external value
//! transfer (a chain transaction, a clearing-house batch, an operator
//! approval) that this crate has no business performing itself. When an
//! account's threshold crossing requests settlement (§4.5 step 2), the
//! caller hands the request to whatever implements [`SettlementExecutor`]
//! and reacts to its acknowledgment — the same request/adapter shape
//! [`crate::BilateralLedger`]'s caller already uses for payment handling
//! one layer up.

use async_trait::async_trait;

use meshnode_core::{PeerId, TokenId};

/// Requests settlement of an outstanding balance and reports whether the
/// external transfer succeeded.
#[async_trait]
pub trait SettlementExecutor: Send + Sync {
    async fn settle(&self, peer: &PeerId, token: &TokenId, amount: u64) -> bool;
}

/// An executor that acknowledges every settlement request immediately.
/// Stands in for a real settlement rail (on-chain transfer, clearing
/// house) until one is configured; always reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSettlementExecutor;

#[async_trait]
impl SettlementExecutor for NoopSettlementExecutor {
    async fn settle(&self, _peer: &PeerId, _token: &TokenId, _amount: u64) -> bool {
        true
    }
}
