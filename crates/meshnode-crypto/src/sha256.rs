//! # SHA-256 Digest Computation
//!
//! Two digest paths, matching the two ways SHA-256 is used in this
//! system:
//!
//! - `sha256_bytes` hashes raw bytes — used for a Prepare's
//!   `executionCondition` and a Fulfill's `fulfillment` preimage match
//!   (§3's invariant: `SHA256(preimage) == executionCondition`).
//! - `sha256_canonical` hashes `&CanonicalBytes` — used for follow event
//!   content digests, so two nodes serializing the same event
//!   independently compute the same digest before verifying its
//!   signature.

use meshnode_core::{CanonicalBytes, ExecutionDigest};
use sha2::{Digest, Sha256};

/// SHA-256 over raw bytes, yielding a 32-byte digest.
pub fn sha256_bytes(data: &[u8]) -> ExecutionDigest {
    let hash = Sha256::digest(data);
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hash);
    ExecutionDigest::from_bytes(bytes)
}

/// SHA-256 over canonical bytes, for content addressing signed events.
pub fn sha256_canonical(data: &CanonicalBytes) -> ExecutionDigest {
    sha256_bytes(data.as_bytes())
}

/// True iff `preimage` hashes under SHA-256 to `condition` — the
/// Prepare/Fulfill matching rule in §3.
pub fn matches_condition(preimage: &[u8], condition: &ExecutionDigest) -> bool {
    &sha256_bytes(preimage) == condition
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bytes_is_a_valid_preimage() {
        // Boundary case: empty packet data round-trips through the adapter.
        let condition = sha256_bytes(b"");
        assert!(matches_condition(b"", &condition));
    }

    #[test]
    fn mismatched_preimage_fails() {
        let condition = sha256_bytes(b"x");
        assert!(!matches_condition(b"y", &condition));
    }

    #[test]
    fn canonical_and_raw_paths_agree_on_the_same_bytes() {
        let data = serde_json::json!({"a": 1});
        let canonical = CanonicalBytes::new(&data).unwrap();
        let via_canonical = sha256_canonical(&canonical);
        let via_raw = sha256_bytes(canonical.as_bytes());
        assert_eq!(via_canonical, via_raw);
    }
}
