//! # Packet Data Model
//!
//! Defines `Packet` (Prepare/Fulfill/Reject) and the closed `ErrorCode`
//! set shared by every component that produces or consumes packets:
//! the state machine, the forwarding engine, the payment handler
//! adapter, and the peer wire codec.
//!
//! ## Implements
//!
//! §3 — Packet, ErrorCode.

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::digest::ExecutionDigest;
use crate::identity::{NodeId, PacketId};

/// A closed set of wire error codes with prefixes F (final), T
/// (temporary), R (relative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Bad request.
    F00,
    /// Destination unreachable.
    F02,
    /// Invalid amount.
    F03,
    /// Unexpected payment.
    F06,
    /// Application error; catch-all for unmapped business rejections.
    F99,
    /// Internal error.
    T00,
    /// Peer unreachable.
    T01,
    /// Insufficient liquidity.
    T04,
    /// Transfer timed out.
    R00,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::F00 => "F00",
            ErrorCode::F02 => "F02",
            ErrorCode::F03 => "F03",
            ErrorCode::F06 => "F06",
            ErrorCode::F99 => "F99",
            ErrorCode::T00 => "T00",
            ErrorCode::T01 => "T01",
            ErrorCode::T04 => "T04",
            ErrorCode::R00 => "R00",
        }
    }

    /// True for codes in the `F` (final, never retry) family.
    pub fn is_final(&self) -> bool {
        self.as_str().starts_with('F')
    }

    /// True for codes in the `T` (temporary) family.
    pub fn is_temporary(&self) -> bool {
        self.as_str().starts_with('T')
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Prepare packet: a request to move `amount` toward `destination`,
/// releasable only by a preimage of `execution_condition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prepare {
    pub id: PacketId,
    pub destination: Address,
    pub amount: u64,
    pub execution_condition: ExecutionDigest,
    pub expires_at: crate::temporal::Timestamp,
    #[serde(with = "serde_bytes_b64")]
    pub data: Vec<u8>,
}

/// A Fulfill packet: the cryptographic release of value for a Prepare
/// sharing the same `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fulfill {
    pub id: PacketId,
    pub fulfillment: ExecutionDigest,
    #[serde(with = "serde_bytes_b64")]
    pub data: Vec<u8>,
}

impl Fulfill {
    /// The fulfillment field of a Fulfill doubles as the 32-byte
    /// preimage; verifying it against a Prepare's condition is SHA-256
    /// over this value's raw bytes, done in `meshnode-crypto`.
    pub fn fulfillment_bytes(&self) -> &[u8; 32] {
        self.fulfillment.as_bytes()
    }
}

/// A Reject packet: an error response carrying the node that first
/// detected the failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reject {
    pub id: PacketId,
    pub code: ErrorCode,
    pub message: String,
    pub triggered_by: NodeId,
    #[serde(with = "serde_bytes_b64")]
    pub data: Vec<u8>,
}

/// The tagged Prepare/Fulfill/Reject variant exchanged on the peer wire
/// and passed through the packet state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Packet {
    #[serde(rename = "PREPARE")]
    Prepare(Prepare),
    #[serde(rename = "FULFILL")]
    Fulfill(Fulfill),
    #[serde(rename = "REJECT")]
    Reject(Reject),
}

impl Packet {
    pub fn id(&self) -> PacketId {
        match self {
            Packet::Prepare(p) => p.id,
            Packet::Fulfill(f) => f.id,
            Packet::Reject(r) => r.id,
        }
    }
}

/// Build a Reject with this node stamped as `triggeredBy`, per §7's
/// "user-visible behavior" rule that rejecting connectors localize
/// faults to themselves.
pub fn reject_from_here(id: PacketId, code: ErrorCode, message: impl Into<String>, here: &NodeId) -> Reject {
    Reject {
        id,
        code,
        message: message.into(),
        triggered_by: here.clone(),
        data: Vec::new(),
    }
}

mod serde_bytes_b64 {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_families() {
        assert!(ErrorCode::F02.is_final());
        assert!(!ErrorCode::F02.is_temporary());
        assert!(ErrorCode::T04.is_temporary());
        assert!(!ErrorCode::T04.is_final());
    }

    #[test]
    fn error_code_display_matches_wire_form() {
        assert_eq!(ErrorCode::R00.to_string(), "R00");
    }

    #[test]
    fn reject_from_here_stamps_triggered_by() {
        let here = NodeId::new("node-a");
        let id = crate::temporal::generate_packet_id();
        let reject = reject_from_here(id, ErrorCode::F02, "no route", &here);
        assert_eq!(reject.triggered_by, here);
        assert_eq!(reject.code, ErrorCode::F02);
    }

    #[test]
    fn packet_tag_round_trips() {
        let id = crate::temporal::generate_packet_id();
        let reject = Packet::Reject(reject_from_here(id, ErrorCode::F99, "oops", &NodeId::new("n")));
        let json = serde_json::to_string(&reject).unwrap();
        assert!(json.contains("\"type\":\"REJECT\""));
        let parsed: Packet = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id(), id);
    }
}
