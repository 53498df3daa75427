//! # Telemetry Wire Types
//!
//! `TelemetryMessage` is the shape carried over the telemetry WebSocket
//! in both directions that matter to the connector: emitted outbound by
//! the emitter, and fanned out by the server to dashboard clients.
//!
//! ## Implements
//!
//! §3 — TelemetryMessage. §6 — telemetry wire protocol.

use serde::{Deserialize, Serialize};

use meshnode_core::{NodeId, Timestamp};

/// The closed set of telemetry event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelemetryEventType {
    NodeStatus,
    PacketSent,
    PacketReceived,
    RouteLookup,
    Log,
    AccountBalance,
    SettlementTriggered,
    SettlementCompleted,
}

/// A single telemetry event, tagged by type and carrying an arbitrary
/// JSON payload specific to that type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryMessage {
    #[serde(rename = "type")]
    pub event_type: TelemetryEventType,
    pub node_id: NodeId,
    pub timestamp: Timestamp,
    pub data: serde_json::Value,
}

impl TelemetryMessage {
    pub fn new(event_type: TelemetryEventType, node_id: NodeId, data: serde_json::Value) -> Self {
        Self {
            event_type,
            node_id,
            timestamp: Timestamp::now(),
            data,
        }
    }

    /// True for the two settlement event kinds that feed the telemetry
    /// server's bounded settlement-events ring (§4.9 step 3).
    pub fn is_settlement_event(&self) -> bool {
        matches!(
            self.event_type,
            TelemetryEventType::SettlementTriggered | TelemetryEventType::SettlementCompleted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_type_tag_as_screaming_snake_case() {
        let msg = TelemetryMessage::new(
            TelemetryEventType::SettlementTriggered,
            NodeId::new("node-a"),
            serde_json::json!({}),
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "SETTLEMENT_TRIGGERED");
    }

    #[test]
    fn settlement_events_are_identified() {
        let triggered = TelemetryMessage::new(TelemetryEventType::SettlementTriggered, NodeId::new("n"), serde_json::json!({}));
        let completed = TelemetryMessage::new(TelemetryEventType::SettlementCompleted, NodeId::new("n"), serde_json::json!({}));
        let status = TelemetryMessage::new(TelemetryEventType::NodeStatus, NodeId::new("n"), serde_json::json!({}));
        assert!(triggered.is_settlement_event());
        assert!(completed.is_settlement_event());
        assert!(!status.is_settlement_event());
    }
}
