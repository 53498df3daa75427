//! # Pending Prepare State Machine
//!
//! Tracks in-flight outbound Prepare packets between their forward and
//! their terminal outcome. One entry exists per hop the forwarding engine
//! has sent downstream and not yet resolved.
//!
//! States: `Sent → (Fulfilled | Rejected | TimedOut)`. Transitions are
//! monotonic and runtime-checked, mirroring the corridor-style
//! `try_transition()` pattern: entries live in a shared map keyed by
//! packet id, retrieved and mutated at runtime rather than threaded
//! through the type system.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use meshnode_core::{PacketId, PeerId, Timestamp};

/// Current state of a pending outbound Prepare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingPrepareState {
    /// Forwarded downstream, awaiting Fulfill or Reject.
    Sent,
    /// Correlated Fulfill received.
    Fulfilled,
    /// Correlated Reject received.
    Rejected,
    /// Deadline passed with no correlated response.
    TimedOut,
}

impl PendingPrepareState {
    /// Whether this state is terminal.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Sent)
    }
}

impl std::fmt::Display for PendingPrepareState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Sent => "SENT",
            Self::Fulfilled => "FULFILLED",
            Self::Rejected => "REJECTED",
            Self::TimedOut => "TIMED_OUT",
        };
        f.write_str(s)
    }
}

/// Errors from a pending-prepare transition attempt.
#[derive(Error, Debug)]
pub enum PendingPrepareError {
    /// The requested transition is not reachable from the current state.
    #[error("invalid pending-prepare transition: {from} -> {to}")]
    InvalidTransition {
        from: PendingPrepareState,
        to: PendingPrepareState,
    },
}

/// An in-flight outbound Prepare: created when the forwarding engine sends
/// a Prepare downstream, destroyed on its correlated Fulfill/Reject or on
/// deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPrepare {
    pub id: PacketId,
    pub upstream_peer: PeerId,
    pub downstream_peer: PeerId,
    pub amount: u64,
    pub deadline: Timestamp,
    state: PendingPrepareState,
}

impl PendingPrepare {
    /// Record a new entry in the `Sent` state.
    pub fn new(
        id: PacketId,
        upstream_peer: PeerId,
        downstream_peer: PeerId,
        amount: u64,
        deadline: Timestamp,
    ) -> Self {
        Self {
            id,
            upstream_peer,
            downstream_peer,
            amount,
            deadline,
            state: PendingPrepareState::Sent,
        }
    }

    /// Current state.
    pub fn state(&self) -> PendingPrepareState {
        self.state
    }

    /// Whether the entry has reached a terminal state and may be removed.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether `now` is at or past this entry's deadline.
    pub fn is_expired(&self, now: &Timestamp) -> bool {
        now.is_at_or_after(&self.deadline)
    }

    /// Attempt a transition with runtime validation. Only `Sent` may
    /// advance, and only to one of the three terminal states.
    pub fn try_transition(
        &mut self,
        to: PendingPrepareState,
    ) -> Result<(), PendingPrepareError> {
        let valid = matches!(
            (self.state, to),
            (PendingPrepareState::Sent, PendingPrepareState::Fulfilled)
                | (PendingPrepareState::Sent, PendingPrepareState::Rejected)
                | (PendingPrepareState::Sent, PendingPrepareState::TimedOut)
        );

        if !valid {
            return Err(PendingPrepareError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry() -> PendingPrepare {
        PendingPrepare::new(
            PacketId::from_bytes([7u8; 16]),
            PeerId::new("upstream-peer"),
            PeerId::new("downstream-peer"),
            100,
            Timestamp::now().plus_seconds(30),
        )
    }

    #[test]
    fn starts_in_sent_state() {
        let entry = make_entry();
        assert_eq!(entry.state(), PendingPrepareState::Sent);
        assert!(!entry.is_terminal());
    }

    #[test]
    fn sent_to_fulfilled_is_valid() {
        let mut entry = make_entry();
        entry.try_transition(PendingPrepareState::Fulfilled).unwrap();
        assert_eq!(entry.state(), PendingPrepareState::Fulfilled);
        assert!(entry.is_terminal());
    }

    #[test]
    fn sent_to_rejected_is_valid() {
        let mut entry = make_entry();
        entry.try_transition(PendingPrepareState::Rejected).unwrap();
        assert_eq!(entry.state(), PendingPrepareState::Rejected);
    }

    #[test]
    fn sent_to_timed_out_is_valid() {
        let mut entry = make_entry();
        entry.try_transition(PendingPrepareState::TimedOut).unwrap();
        assert_eq!(entry.state(), PendingPrepareState::TimedOut);
    }

    #[test]
    fn terminal_states_reject_further_transitions() {
        let mut entry = make_entry();
        entry.try_transition(PendingPrepareState::Fulfilled).unwrap();
        let result = entry.try_transition(PendingPrepareState::Rejected);
        assert!(result.is_err());
        // state unchanged
        assert_eq!(entry.state(), PendingPrepareState::Fulfilled);
    }

    #[test]
    fn transitions_are_monotonic_not_reversible() {
        let mut entry = make_entry();
        entry.try_transition(PendingPrepareState::TimedOut).unwrap();
        assert!(entry.try_transition(PendingPrepareState::Sent).is_err());
    }

    #[test]
    fn expiry_uses_inclusive_deadline_comparison() {
        let entry = PendingPrepare::new(
            PacketId::from_bytes([1u8; 16]),
            PeerId::new("u"),
            PeerId::new("d"),
            50,
            Timestamp::now(),
        );
        let later = entry.deadline.plus_millis(1);
        assert!(entry.is_expired(&later));
    }

    #[test]
    fn serde_round_trip_preserves_state() {
        let mut entry = make_entry();
        entry.try_transition(PendingPrepareState::Rejected).unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: PendingPrepare = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.state(), PendingPrepareState::Rejected);
        assert_eq!(parsed.id, entry.id);
    }

    #[test]
    fn state_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&PendingPrepareState::TimedOut).unwrap();
        assert_eq!(json, "\"TIMED_OUT\"");
    }
}
