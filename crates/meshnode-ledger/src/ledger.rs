//! # Bilateral Ledger
//!
//! Holds every peer's `BilateralAccount`, one lock per account so a
//! single-hop mutation never blocks unrelated peers. A hop touches two
//! accounts at once (the upstream peer is debited, the downstream peer
//! is credited) — per §5's concurrency discipline, both locks are
//! acquired in a fixed order (peer ID lexicographic) so two hops
//! touching the same pair of peers in opposite directions cannot
//! deadlock.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use meshnode_core::{PeerId, TokenId};

use crate::account::{BilateralAccount, LedgerError, SettlementState};

/// Outcome of applying one forwarding hop to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopOutcome {
    pub downstream_triggered_settlement: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountLookupError {
    #[error("no bilateral account registered for peer {0} token {1}")]
    NotFound(PeerId, TokenId),
}

/// Errors raised while driving an account through the settlement
/// lifecycle from outside `meshnode-ledger` (no account for the peer, or
/// an out-of-order transition request).
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error(transparent)]
    Lookup(#[from] AccountLookupError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// The node's complete set of bilateral accounts.
#[derive(Debug, Default)]
pub struct BilateralLedger {
    accounts: RwLock<HashMap<(PeerId, TokenId), Mutex<BilateralAccount>>>,
}

impl BilateralLedger {
    pub fn new() -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Register an account for a configured peer link. Called once at
    /// configuration load for each `(peer, token)` pair.
    pub fn register(
        &self,
        peer_id: PeerId,
        token_id: TokenId,
        credit_limit: u64,
        settlement_threshold: u64,
    ) {
        let account = BilateralAccount::new(peer_id.clone(), token_id.clone(), credit_limit, settlement_threshold);
        self.accounts
            .write()
            .expect("ledger accounts lock poisoned")
            .insert((peer_id, token_id), Mutex::new(account));
    }

    /// Apply a forwarding hop: debit the upstream peer, credit the
    /// downstream peer, under locks acquired in lexicographic peer-ID
    /// order regardless of which direction the hop runs.
    pub fn apply_hop(
        &self,
        upstream: &PeerId,
        downstream: &PeerId,
        token: &TokenId,
        amount: u64,
    ) -> Result<HopOutcome, LedgerError> {
        let (first, second) = if upstream <= downstream {
            (upstream, downstream)
        } else {
            (downstream, upstream)
        };

        let accounts = self
            .accounts
            .read()
            .expect("ledger accounts lock poisoned");

        let first_entry = accounts.get(&(first.clone(), token.clone()));
        let second_entry = accounts.get(&(second.clone(), token.clone()));

        // Lock in the fixed order, then dispatch the debit/credit by role.
        match (first_entry, second_entry) {
            (Some(first_lock), Some(second_lock)) if first == second => {
                // Same peer would mean a self-loop hop; not a valid topology,
                // but avoid a double-lock deadlock defensively.
                let mut only = first_lock.lock().expect("account lock poisoned");
                apply_role(&mut only, upstream, downstream, amount)
            }
            (Some(first_lock), Some(second_lock)) => {
                let mut first_account = first_lock.lock().expect("account lock poisoned");
                let mut second_account = second_lock.lock().expect("account lock poisoned");
                let (upstream_account, downstream_account) = if first == upstream {
                    (&mut *first_account, &mut *second_account)
                } else {
                    (&mut *second_account, &mut *first_account)
                };
                downstream_account.credit(amount)?;
                upstream_account.debit(amount);
                let triggered = downstream_account.evaluate_settlement();
                upstream_account.evaluate_settlement();
                Ok(HopOutcome {
                    downstream_triggered_settlement: triggered,
                })
            }
            _ => Err(LedgerError::CreditLimitExceeded {
                peer: downstream.clone(),
                amount,
                limit: 0,
            }),
        }
    }

    /// Whether `downstream` can admit `amount` more credit under its
    /// configured limit, without mutating any balance. The forwarding
    /// engine's §4.3 step-5 capacity check, applied before a Prepare is
    /// sent onward; the actual credit/debit is committed later by
    /// `apply_hop` once the hop's Fulfill is verified.
    pub fn would_admit(
        &self,
        downstream: &PeerId,
        token: &TokenId,
        amount: u64,
    ) -> Result<bool, AccountLookupError> {
        let accounts = self.accounts.read().expect("ledger accounts lock poisoned");
        let entry = accounts
            .get(&(downstream.clone(), token.clone()))
            .ok_or_else(|| AccountLookupError::NotFound(downstream.clone(), token.clone()))?;
        let result = entry.lock().expect("account lock poisoned").admits(amount);
        Ok(result)
    }

    pub fn settlement_state(
        &self,
        peer_id: &PeerId,
        token_id: &TokenId,
    ) -> Result<SettlementState, AccountLookupError> {
        let accounts = self.accounts.read().expect("ledger accounts lock poisoned");
        let entry = accounts
            .get(&(peer_id.clone(), token_id.clone()))
            .ok_or_else(|| AccountLookupError::NotFound(peer_id.clone(), token_id.clone()))?;
        let result = entry.lock().expect("account lock poisoned").settlement_state();
        Ok(result)
    }

    /// Move an account `Triggered → Settling` once a settlement request
    /// has been handed to the external executor.
    pub fn begin_settling(&self, peer: &PeerId, token: &TokenId) -> Result<(), SettlementError> {
        let accounts = self.accounts.read().expect("ledger accounts lock poisoned");
        let entry = accounts
            .get(&(peer.clone(), token.clone()))
            .ok_or_else(|| AccountLookupError::NotFound(peer.clone(), token.clone()))?;
        entry.lock().expect("account lock poisoned").begin_settling()?;
        Ok(())
    }

    /// Record the executor's acknowledgment: reset the settled portion of
    /// the balance and return to `Idle`. Returns `true` if a queued
    /// threshold crossing immediately re-triggered settlement.
    pub fn acknowledge_settlement(
        &self,
        peer: &PeerId,
        token: &TokenId,
        settled_amount: u64,
    ) -> Result<bool, SettlementError> {
        let accounts = self.accounts.read().expect("ledger accounts lock poisoned");
        let entry = accounts
            .get(&(peer.clone(), token.clone()))
            .ok_or_else(|| AccountLookupError::NotFound(peer.clone(), token.clone()))?;
        let result = entry
            .lock()
            .expect("account lock poisoned")
            .acknowledge_settlement(settled_amount)?;
        Ok(result)
    }

    /// Current net balance for one account, for a `SETTLEMENT_TRIGGERED`
    /// telemetry payload.
    pub fn net_balance(&self, peer: &PeerId, token: &TokenId) -> Result<i64, AccountLookupError> {
        let accounts = self.accounts.read().expect("ledger accounts lock poisoned");
        let entry = accounts
            .get(&(peer.clone(), token.clone()))
            .ok_or_else(|| AccountLookupError::NotFound(peer.clone(), token.clone()))?;
        let result = entry.lock().expect("account lock poisoned").net_balance();
        Ok(result)
    }

    /// Snapshot balances for every registered account, for telemetry
    /// `ACCOUNT_BALANCE` reporting.
    pub fn snapshot(&self) -> Vec<BilateralAccount> {
        let accounts = self.accounts.read().expect("ledger accounts lock poisoned");
        accounts
            .values()
            .map(|lock| lock.lock().expect("account lock poisoned").clone())
            .collect()
    }
}

fn apply_role(
    account: &mut BilateralAccount,
    upstream: &PeerId,
    downstream: &PeerId,
    amount: u64,
) -> Result<HopOutcome, LedgerError> {
    debug_assert_eq!(upstream, downstream);
    account.credit(amount)?;
    account.debit(amount);
    let triggered = account.evaluate_settlement();
    Ok(HopOutcome {
        downstream_triggered_settlement: triggered,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (BilateralLedger, PeerId, PeerId, TokenId) {
        let ledger = BilateralLedger::new();
        let upstream = PeerId::new("peer-up");
        let downstream = PeerId::new("peer-down");
        let token = TokenId::new("usd");
        ledger.register(upstream.clone(), token.clone(), 10_000, 8_000);
        ledger.register(downstream.clone(), token.clone(), 10_000, 8_000);
        (ledger, upstream, downstream, token)
    }

    #[test]
    fn hop_credits_downstream_and_debits_upstream() {
        let (ledger, upstream, downstream, token) = setup();
        ledger.apply_hop(&upstream, &downstream, &token, 1_000).unwrap();
        let snapshot = ledger.snapshot();
        let up = snapshot.iter().find(|a| a.peer_id == upstream).unwrap();
        let down = snapshot.iter().find(|a| a.peer_id == downstream).unwrap();
        assert_eq!(up.debit_balance, 1_000);
        assert_eq!(down.credit_balance, 1_000);
    }

    #[test]
    fn lock_order_is_independent_of_hop_direction() {
        // Regardless of whether peer-up or peer-down is the lexicographic
        // first, the correct account gets the credit vs debit.
        let (ledger, upstream, downstream, token) = setup();
        // Hop the opposite direction too.
        ledger.apply_hop(&downstream, &upstream, &token, 500).unwrap();
        let snapshot = ledger.snapshot();
        let up = snapshot.iter().find(|a| a.peer_id == upstream).unwrap();
        let down = snapshot.iter().find(|a| a.peer_id == downstream).unwrap();
        assert_eq!(up.credit_balance, 500);
        assert_eq!(down.debit_balance, 500);
    }

    #[test]
    fn would_admit_does_not_mutate_balances() {
        let (ledger, _upstream, downstream, token) = setup();
        assert!(ledger.would_admit(&downstream, &token, 9_000).unwrap());
        assert!(!ledger.would_admit(&downstream, &token, 10_001).unwrap());
        let snapshot = ledger.snapshot();
        let down = snapshot.iter().find(|a| a.peer_id == downstream).unwrap();
        assert_eq!(down.credit_balance, 0);
    }

    #[test]
    fn hop_against_unregistered_peer_fails() {
        let (ledger, upstream, _downstream, token) = setup();
        let unknown = PeerId::new("peer-ghost");
        assert!(ledger.apply_hop(&upstream, &unknown, &token, 100).is_err());
    }

    #[test]
    fn eight_hops_trigger_exactly_once() {
        let (ledger, upstream, downstream, token) = setup();
        let mut triggers = 0;
        for _ in 0..8 {
            let outcome = ledger.apply_hop(&upstream, &downstream, &token, 1_000).unwrap();
            if outcome.downstream_triggered_settlement {
                triggers += 1;
            }
        }
        assert_eq!(triggers, 1);
        assert_eq!(
            ledger.settlement_state(&downstream, &token).unwrap(),
            SettlementState::Triggered
        );
    }

    #[test]
    fn settlement_round_trip_resets_net_balance_to_zero() {
        // S5: eight 1000-unit hops trigger once; begin_settling +
        // acknowledge_settlement walks the account back to Idle with
        // netBalance reset to 0.
        let (ledger, upstream, downstream, token) = setup();
        for _ in 0..8 {
            ledger.apply_hop(&upstream, &downstream, &token, 1_000).unwrap();
        }
        assert_eq!(ledger.net_balance(&downstream, &token).unwrap(), 8_000);

        ledger.begin_settling(&downstream, &token).unwrap();
        assert_eq!(
            ledger.settlement_state(&downstream, &token).unwrap(),
            SettlementState::Settling
        );

        let retriggered = ledger
            .acknowledge_settlement(&downstream, &token, 8_000)
            .unwrap();
        assert!(!retriggered);
        assert_eq!(
            ledger.settlement_state(&downstream, &token).unwrap(),
            SettlementState::Idle
        );
        assert_eq!(ledger.net_balance(&downstream, &token).unwrap(), 0);
    }

    #[test]
    fn settlement_lifecycle_on_unregistered_peer_fails() {
        let (ledger, _upstream, _downstream, token) = setup();
        let ghost = PeerId::new("peer-ghost");
        assert!(matches!(
            ledger.begin_settling(&ghost, &token).unwrap_err(),
            SettlementError::Lookup(AccountLookupError::NotFound(..))
        ));
    }
}
