//! # Temporal Types — Clock & ID Service
//!
//! Defines `Timestamp`, the node's notion of "now" used for expiry
//! comparisons throughout the packet state machine, and the random
//! 128-bit packet ID generator.
//!
//! ## Implements
//!
//! §2.1 — Clock & ID service: monotonic now, expiry comparisons, random
//! 128-bit packet IDs, base64url encoding.

use chrono::{DateTime, Duration, Timelike, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::identity::PacketId;

/// A UTC instant, truncated to millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current instant.
    pub fn now() -> Self {
        let now = Utc::now();
        let millis = now.nanosecond() / 1_000_000;
        Self(now.with_nanosecond(millis * 1_000_000).unwrap_or(now))
    }

    /// Wrap an existing `DateTime<Utc>`.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// This instant plus the given number of seconds. Used to compute a
    /// Prepare's `expiresAt` from a requested TTL.
    pub fn plus_seconds(&self, seconds: i64) -> Self {
        Self(self.0 + Duration::seconds(seconds))
    }

    /// This instant plus the given number of milliseconds.
    pub fn plus_millis(&self, millis: i64) -> Self {
        Self(self.0 + Duration::milliseconds(millis))
    }

    /// Whether `self` is at or past `other`. A Prepare with
    /// `now.is_at_or_after(&expires_at)` has expired (§4.3 step 2).
    pub fn is_at_or_after(&self, other: &Timestamp) -> bool {
        self.0 >= other.0
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// ISO8601 with `Z` suffix, e.g. `2026-01-15T12:00:00.000Z`.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

/// Generates a random 128-bit packet ID, base64url-encoded without
/// padding (§2.1). A plain function rather than a struct: there is no
/// state to hold, only a source of randomness supplied by the OS RNG.
pub fn generate_packet_id() -> PacketId {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    PacketId::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_truncates_to_milliseconds() {
        let t = Timestamp::now();
        assert_eq!(t.as_datetime().timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[test]
    fn expiry_comparison() {
        let earlier = Timestamp::now();
        let later = earlier.plus_seconds(30);
        assert!(later.is_at_or_after(&earlier));
        assert!(!earlier.is_at_or_after(&later));
    }

    #[test]
    fn expiry_is_inclusive() {
        let t = Timestamp::now();
        assert!(t.is_at_or_after(&t));
    }

    #[test]
    fn packet_ids_are_random() {
        let a = generate_packet_id();
        let b = generate_packet_id();
        assert_ne!(a, b);
    }

    #[test]
    fn iso8601_has_z_suffix() {
        let t = Timestamp::now();
        assert!(t.to_iso8601().ends_with('Z'));
    }
}
