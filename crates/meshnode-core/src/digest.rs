//! # Digest Types
//!
//! Defines `ExecutionDigest`, the 32-byte SHA-256 value used both as a
//! Prepare's `executionCondition`/a Fulfill's `fulfillment` preimage
//! hash (§3), and as the generic content digest used elsewhere (follow
//! event bodies, audit record hashes).

use serde::{Deserialize, Serialize};

/// A 32-byte SHA-256 digest.
///
/// Computation lives in `meshnode-crypto`, which is the only place
/// permitted to construct one from raw or canonical input; this type is
/// the shared representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionDigest(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl ExecutionDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl std::fmt::Display for ExecutionDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sha256:{}", self.to_hex())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        serializer.serialize_str(&hex)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        if s.len() != 64 {
            return Err(serde::de::Error::custom("expected 64 hex characters"));
        }
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|_| serde::de::Error::custom("invalid hex digit"))?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let digest = ExecutionDigest::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&digest).unwrap();
        let parsed: ExecutionDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(digest, parsed);
    }

    #[test]
    fn display_has_sha256_prefix() {
        let digest = ExecutionDigest::from_bytes([0u8; 32]);
        assert!(digest.to_string().starts_with("sha256:"));
    }
}
