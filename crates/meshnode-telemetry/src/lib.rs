//! # meshnode-telemetry — Telemetry Wire Types and Connector-Side Emitter
//!
//! The connector's outbound half of the telemetry pipeline: typed event
//! shapes (§3's TelemetryMessage) and a reconnecting WebSocket emitter
//! (§4.10). The server-side fan-out lives in `meshnode-api`, which
//! depends on this crate for the shared wire type.

pub mod emitter;
pub mod message;

pub use emitter::TelemetryEmitter;
pub use message::{TelemetryEventType, TelemetryMessage};
