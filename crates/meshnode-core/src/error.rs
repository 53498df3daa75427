//! # Error Types — Structured Error Hierarchy
//!
//! Defines the error types shared across the connector's crates. All
//! errors use `thiserror` for derive-based `Display` and `Error`
//! implementations.

use thiserror::Error;

/// Top-level error type for `meshnode-core`.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error validating an `Address`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    #[error("address must have at least one segment")]
    Empty,

    #[error("address must not have a leading or trailing dot")]
    LeadingOrTrailingDot,

    #[error("address must not contain an empty segment")]
    EmptySegment,
}

/// Error during canonical serialization (used when signing follow
/// events and hashing their content for routing).
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    #[error("float values are not permitted in canonical representations; use string or integer: {0}")]
    FloatRejected(f64),

    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Error in cryptographic operations (signing, verification, digests).
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("signature verification failed: {0}")]
    VerificationFailed(String),

    #[error("key error: {0}")]
    KeyError(String),

    #[error("digest error: {0}")]
    DigestError(String),
}
