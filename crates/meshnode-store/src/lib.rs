//! # meshnode-store — Persistent State and Operational Guardrails
//!
//! Implements the connector's persistent state layout and the
//! operational guardrails that sit in front of wallet and transaction
//! flows:
//!
//! - **Database** (`db.rs`): optional Postgres pool, falling back to an
//!   in-memory backend when `DATABASE_URL` is unset.
//!
//! - **Audit** (`audit.rs`): append-only audit log, always mirrored to
//!   the structured logger regardless of backend.
//!
//! - **Wallet** (`wallet.rs`): wallet metadata and balance-history
//!   tables.
//!
//! - **Rate limiter** (`rate_limiter.rs`): sliding-window operation
//!   rate limiting per `(operation, identifier)`.
//!
//! - **Suspicious activity** (`suspicious.rs`): rapid-funding and
//!   outlier-transaction-amount detection per agent.
//!
//! ## Crate Policy
//!
//! - Depends on `meshnode-core` internally.
//! - Every table has a Postgres-backed and an in-memory implementation
//!   selected at construction time, never at call time.

pub mod audit;
pub mod db;
pub mod rate_limiter;
pub mod suspicious;
pub mod wallet;

pub use audit::{AuditLogger, AuditQuery, AuditRecord, AuditResult};
pub use rate_limiter::{limit_for, RateLimiter};
pub use suspicious::SuspiciousActivityDetector;
pub use wallet::{BalanceRecord, WalletMetadata, WalletStore, WalletStoreError};
