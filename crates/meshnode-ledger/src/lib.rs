//! # meshnode-ledger — Bilateral Ledger and Settlement
//!
//! Each configured peer link gets one `BilateralAccount` per settlement
//! token. A forwarding hop debits the upstream account and credits the
//! downstream account atomically with a settlement-threshold check;
//! crossing the threshold moves the account through
//! `Idle → Triggered → Settling → Idle`.
//!
//! ## Crate Policy
//!
//! - Depends only on `meshnode-core`.
//! - Cross-account mutations acquire per-account locks in peer-ID
//!   lexicographic order (§5's concurrency discipline) to avoid deadlock.

pub mod account;
pub mod ledger;
pub mod settlement;

pub use account::{BilateralAccount, LedgerError, SettlementState};
pub use ledger::{AccountLookupError, BilateralLedger, HopOutcome, SettlementError};
pub use settlement::{NoopSettlementExecutor, SettlementExecutor};
