//! # meshnode-core — Foundational Types for the Connector
//!
//! This crate is the bedrock of the meshnode connector. It defines the
//! core data model shared by every other crate in the workspace:
//! addresses, packets, error codes, identifiers, timestamps, and
//! canonical serialization. It depends on no other internal crate.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `NodeId`, `PeerId`,
//!    `AgentId`, `TokenId`, `PacketId` — no bare strings for identifiers.
//!
//! 2. **`CanonicalBytes` newtype.** Signing input for follow events flows
//!    through `CanonicalBytes::new()`, never raw `serde_json::to_vec()`.
//!
//! 3. **`Address` enforces segment validity at construction.** There is
//!    no way to hold a malformed address past the parse boundary.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `meshnode-*` crates (leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.
//! - All public types derive `Debug`, `Clone`, and implement `Serialize`/`Deserialize`.

pub mod address;
pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod packet;
pub mod temporal;

pub use address::Address;
pub use canonical::CanonicalBytes;
pub use digest::ExecutionDigest;
pub use error::CoreError;
pub use identity::{AgentId, NodeId, PacketId, PeerId, TokenId};
pub use packet::{reject_from_here, ErrorCode, Fulfill, Packet, Prepare, Reject};
pub use temporal::{generate_packet_id, Timestamp};
