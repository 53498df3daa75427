//! # Bilateral Account
//!
//! Per-(peer, token) debit/credit balances and the settlement-threshold
//! state machine that rides on top of them.
//!
//! The settlement state (`Idle → Triggered → Settling → Idle`) is a
//! three-state runtime-checked machine in the same style as the
//! connector's other runtime state machines: the state lives inside a
//! value mutated under a lock, so it is a plain enum with a
//! `try_transition()` guard rather than a typestate generic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use meshnode_core::{PeerId, TokenId};

/// Settlement lifecycle of a bilateral account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementState {
    Idle,
    Triggered,
    Settling,
}

/// Errors raised by bilateral account operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LedgerError {
    #[error("hop of {amount} would exceed credit limit {limit} on peer {peer}")]
    CreditLimitExceeded {
        peer: PeerId,
        amount: u64,
        limit: u64,
    },
    #[error("invalid settlement transition: {from:?} -> {to:?}")]
    InvalidSettlementTransition {
        from: SettlementState,
        to: SettlementState,
    },
}

/// Per-(peer, token) ledger entry.
///
/// Invariant: `debit_balance + credit_balance` is monotonically
/// non-decreasing between settlements. `net_balance()` is expected to
/// stay within `[-credit_limit, +credit_limit]` except during the
/// window between a threshold crossing and settlement acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BilateralAccount {
    pub peer_id: PeerId,
    pub token_id: TokenId,
    pub debit_balance: u64,
    pub credit_balance: u64,
    pub credit_limit: u64,
    pub settlement_threshold: u64,
    settlement_state: SettlementState,
    /// Set when a threshold crossing occurs while not `Idle`; consumed
    /// (re-evaluated) on the next return to `Idle`.
    pending_follow_up: bool,
}

impl BilateralAccount {
    pub fn new(
        peer_id: PeerId,
        token_id: TokenId,
        credit_limit: u64,
        settlement_threshold: u64,
    ) -> Self {
        Self {
            peer_id,
            token_id,
            debit_balance: 0,
            credit_balance: 0,
            credit_limit,
            settlement_threshold,
            settlement_state: SettlementState::Idle,
            pending_follow_up: false,
        }
    }

    pub fn settlement_state(&self) -> SettlementState {
        self.settlement_state
    }

    /// `creditBalance - debitBalance`.
    pub fn net_balance(&self) -> i64 {
        self.credit_balance as i64 - self.debit_balance as i64
    }

    /// Whether extending credit to this peer by `amount` keeps the net
    /// balance within the credit limit — the §4.3 capacity check.
    pub fn admits(&self, amount: u64) -> bool {
        let projected = self.credit_balance as i64 + amount as i64 - self.debit_balance as i64;
        projected.unsigned_abs() <= self.credit_limit
    }

    /// Credit this account (this peer is the downstream of a hop).
    pub fn credit(&mut self, amount: u64) -> Result<(), LedgerError> {
        if !self.admits(amount) {
            return Err(LedgerError::CreditLimitExceeded {
                peer: self.peer_id.clone(),
                amount,
                limit: self.credit_limit,
            });
        }
        self.credit_balance += amount;
        Ok(())
    }

    /// Debit this account (this peer is the upstream of a hop).
    pub fn debit(&mut self, amount: u64) {
        self.debit_balance += amount;
    }

    /// Re-evaluate the settlement state after a balance mutation.
    /// Returns `true` iff this call newly triggered settlement.
    pub fn evaluate_settlement(&mut self) -> bool {
        if self.settlement_state != SettlementState::Idle {
            if self.net_balance().unsigned_abs() >= self.settlement_threshold {
                self.pending_follow_up = true;
            }
            return false;
        }
        if self.net_balance().unsigned_abs() >= self.settlement_threshold {
            self.settlement_state = SettlementState::Triggered;
            true
        } else {
            false
        }
    }

    /// Move `Triggered → Settling` once the external settlement executor
    /// has accepted the request.
    pub fn begin_settling(&mut self) -> Result<(), LedgerError> {
        self.try_transition(SettlementState::Settling)
    }

    /// Settlement executor acknowledged completion: reset the settled
    /// portion of the balances and return to `Idle`. If a threshold
    /// crossing was queued while settling, re-triggers immediately.
    pub fn acknowledge_settlement(&mut self, settled_amount: u64) -> Result<bool, LedgerError> {
        self.try_transition(SettlementState::Idle)?;
        if self.credit_balance >= self.debit_balance {
            self.credit_balance = self.credit_balance.saturating_sub(settled_amount);
        } else {
            self.debit_balance = self.debit_balance.saturating_sub(settled_amount);
        }
        if self.pending_follow_up {
            self.pending_follow_up = false;
            Ok(self.evaluate_settlement())
        } else {
            Ok(false)
        }
    }

    fn try_transition(&mut self, to: SettlementState) -> Result<(), LedgerError> {
        let valid = matches!(
            (self.settlement_state, to),
            (SettlementState::Idle, SettlementState::Triggered)
                | (SettlementState::Triggered, SettlementState::Settling)
                | (SettlementState::Settling, SettlementState::Idle)
        );
        if !valid {
            return Err(LedgerError::InvalidSettlementTransition {
                from: self.settlement_state,
                to,
            });
        }
        self.settlement_state = to;
        Ok(())
    }
}
