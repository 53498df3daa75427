//! # meshnode-state — Pending Prepare State Machine
//!
//! Tracks in-flight outbound Prepare packets from the moment the
//! forwarding engine sends one downstream until it resolves.
//!
//! `PendingPrepare` entries live in a shared, peer-sharded map rather
//! than a single in-process value, so the state transition is
//! runtime-checked via `try_transition()` rather than encoded in the
//! type system: a value pulled out of a `HashMap` at an arbitrary point
//! in its lifecycle has no compile-time state parameter to dispatch on.

pub mod pending_prepare;

pub use pending_prepare::{PendingPrepare, PendingPrepareError, PendingPrepareState};
