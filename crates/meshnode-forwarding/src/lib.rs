//! # meshnode-forwarding — Packet Forwarding Engine
//!
//! The connector's packet-processing core: resolves an inbound Prepare's
//! destination against the routing table, checks downstream liquidity,
//! forwards the hop, and correlates the eventual Fulfill/Reject back to
//! the upstream peer. Prepares addressed to a locally-terminating prefix
//! are handed to the business-layer `PaymentHandler` through the
//! `PaymentHandlerAdapter` instead of being forwarded.
//!
//! ## Crate Policy
//!
//! - Depends on `meshnode-core`, `meshnode-crypto`, `meshnode-state`,
//!   `meshnode-ledger`, `meshnode-routing`, and `meshnode-telemetry`.
//! - Peer I/O is abstracted behind the `PeerSink` trait so the engine has
//!   no transport dependency; the connector binary (or a test fixture)
//!   supplies the implementation. Settlement execution is abstracted
//!   behind `meshnode_ledger::SettlementExecutor` the same way.

pub mod engine;
pub mod handler;

pub use engine::{ForwardingEngine, ForwardingError, PeerSink};
pub use handler::{
    map_reject_reason, DispatchOutcome, HandlerError, HandlerOutcome, PaymentHandler,
    PaymentHandlerAdapter, PaymentRequest, RejectReason,
};
