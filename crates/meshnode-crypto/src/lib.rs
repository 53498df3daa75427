//! # meshnode-crypto — Cryptographic Primitives
//!
//! Provides the two cryptographic building blocks the connector needs:
//!
//! - **SHA-256** over raw bytes for packet execution conditions and
//!   fulfillments, and over `CanonicalBytes` for follow event digests.
//! - **Ed25519** signing and verification for follow events, so a node
//!   receiving one can authenticate its author before the follow-graph
//!   router mutates routing state from it.
//!
//! ## Crate Policy
//!
//! - Depends only on `meshnode-core` internally.
//! - No mocking of cryptographic operations in tests — all tests use
//!   real `CanonicalBytes`, real SHA-256, real Ed25519.
//! - `unsafe` prohibited without `// SAFETY:` justification.

pub mod ed25519;
pub mod sha256;

pub use ed25519::{verify, verify_with_public_key, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use sha256::{matches_condition, sha256_bytes, sha256_canonical};
