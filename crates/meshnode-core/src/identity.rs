//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the connector's identifier namespaces. These
//! prevent accidental identifier confusion — you cannot pass a `PeerId`
//! where a `NodeId` is expected.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Identifier for this connector node, or any node named in routing
/// topology and `triggeredBy` fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for a configured peer link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for an agent originating wallet-creation, funding, or
/// transaction activity — the subject of rate limiting, suspicious
/// activity detection, and audit records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for a settlement asset/token on a peer link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(pub String);

impl TokenId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A packet correlation ID: 128 random bits, carried on the wire as a
/// base64url string without padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PacketId([u8; 16]);

impl PacketId {
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Parse a base64url (no padding) encoded packet ID off the wire.
    pub fn parse(s: &str) -> Result<Self, Base64Error> {
        let decoded = URL_SAFE_NO_PAD.decode(s).map_err(|_| Base64Error::Malformed)?;
        let bytes: [u8; 16] = decoded.try_into().map_err(|_| Base64Error::WrongLength)?;
        Ok(Self(bytes))
    }

    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }
}

impl std::fmt::Display for PacketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64url())
    }
}

impl Serialize for PacketId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64url())
    }
}

impl<'de> Deserialize<'de> for PacketId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PacketId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Error decoding a base64url-encoded identifier off the wire.
#[derive(Debug, thiserror::Error)]
pub enum Base64Error {
    #[error("malformed base64url encoding")]
    Malformed,
    #[error("decoded value has the wrong length")]
    WrongLength,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_id_round_trips_through_base64url() {
        let id = PacketId::from_bytes([7u8; 16]);
        let encoded = id.to_base64url();
        assert!(!encoded.contains('='));
        let parsed = PacketId::parse(&encoded).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn packet_id_rejects_wrong_length() {
        let encoded = URL_SAFE_NO_PAD.encode([1u8; 8]);
        assert!(matches!(PacketId::parse(&encoded), Err(Base64Error::WrongLength)));
    }

    #[test]
    fn packet_id_rejects_malformed_base64() {
        assert!(matches!(PacketId::parse("not base64url!!"), Err(Base64Error::Malformed)));
    }

    #[test]
    fn node_id_display() {
        let id = NodeId::new("node-a");
        assert_eq!(id.to_string(), "node-a");
    }
}
