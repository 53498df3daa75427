//! # Telemetry Hub
//!
//! Owns every piece of server-side telemetry state behind a single
//! background task: the connector status cache, the balance-state map,
//! the bounded settlement-events ring, and the set of connected
//! dashboard clients. All mutations happen inside that task's message
//! loop — callers only ever send a `HubCommand` and, where a reply is
//! needed, await a oneshot response — matching the single-writer actor
//! discipline for telemetry server state (§5).

use std::collections::{HashMap, VecDeque};

use tokio::sync::{mpsc, oneshot};

use meshnode_core::{NodeId, PeerId, TokenId};
use meshnode_telemetry::{TelemetryEventType, TelemetryMessage};

const MAX_SETTLEMENT_EVENTS: usize = 100;

/// A connector's most recently reported balance for one `(peer, token)`
/// link, keyed by `(nodeId, peerId, tokenId)` in the hub's map.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BalanceState {
    pub node_id: NodeId,
    pub peer_id: PeerId,
    pub token_id: TokenId,
    pub data: serde_json::Value,
}

enum HubCommand {
    Ingest {
        message: TelemetryMessage,
    },
    RegisterClient {
        sender: mpsc::UnboundedSender<TelemetryMessage>,
        respond_to: oneshot::Sender<Vec<TelemetryMessage>>,
    },
    GetBalances {
        respond_to: oneshot::Sender<Vec<BalanceState>>,
    },
    GetSettlements {
        respond_to: oneshot::Sender<Vec<TelemetryMessage>>,
    },
}

/// Handle to the hub's background actor. Cheap to clone.
#[derive(Clone)]
pub struct TelemetryHub {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl TelemetryHub {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx));
        Self { commands: tx }
    }

    /// Process one inbound connector event: cache NODE_STATUS, append to
    /// the settlement ring, upsert ACCOUNT_BALANCE, and broadcast to
    /// every registered client (§4.9 steps 2-5).
    pub fn ingest(&self, message: TelemetryMessage) {
        let _ = self.commands.send(HubCommand::Ingest { message });
    }

    /// Register a new dashboard client's outbound channel and receive the
    /// replay of every cached NODE_STATUS (§4.9 "on a new client").
    pub async fn register_client(&self, sender: mpsc::UnboundedSender<TelemetryMessage>) -> Vec<TelemetryMessage> {
        let (respond_to, rx) = oneshot::channel();
        if self.commands.send(HubCommand::RegisterClient { sender, respond_to }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    pub async fn balances(&self) -> Vec<BalanceState> {
        let (respond_to, rx) = oneshot::channel();
        if self.commands.send(HubCommand::GetBalances { respond_to }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Settlement events, newest-first.
    pub async fn settlements(&self) -> Vec<TelemetryMessage> {
        let (respond_to, rx) = oneshot::channel();
        if self.commands.send(HubCommand::GetSettlements { respond_to }).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

#[derive(Default)]
struct HubState {
    status_cache: HashMap<NodeId, TelemetryMessage>,
    balances: HashMap<(NodeId, PeerId, TokenId), BalanceState>,
    settlement_events: VecDeque<TelemetryMessage>,
    clients: Vec<mpsc::UnboundedSender<TelemetryMessage>>,
}

impl HubState {
    fn ingest(&mut self, message: TelemetryMessage) {
        if message.event_type == TelemetryEventType::NodeStatus {
            self.status_cache.insert(message.node_id.clone(), message.clone());
            metrics::gauge!("meshnode_active_connectors").set(self.status_cache.len() as f64);
        }
        if matches!(message.event_type, TelemetryEventType::PacketSent | TelemetryEventType::PacketReceived) {
            metrics::counter!("meshnode_packets_forwarded_total").increment(1);
        }
        if message.is_settlement_event() {
            if self.settlement_events.len() >= MAX_SETTLEMENT_EVENTS {
                self.settlement_events.pop_front();
            }
            self.settlement_events.push_back(message.clone());
            metrics::counter!("meshnode_settlement_events_total").increment(1);
        }
        if message.event_type == TelemetryEventType::AccountBalance {
            if let Some(key) = balance_key(&message) {
                self.balances.insert(
                    key.clone(),
                    BalanceState {
                        node_id: key.0,
                        peer_id: key.1,
                        token_id: key.2,
                        data: message.data.clone(),
                    },
                );
            }
        }
        self.clients.retain(|client| client.send(message.clone()).is_ok());
        metrics::gauge!("meshnode_connected_dashboard_clients").set(self.clients.len() as f64);
    }
}

fn balance_key(message: &TelemetryMessage) -> Option<(NodeId, PeerId, TokenId)> {
    let peer_id = message.data.get("peerId")?.as_str()?;
    let token_id = message.data.get("tokenId")?.as_str()?;
    Some((message.node_id.clone(), PeerId::new(peer_id), TokenId::new(token_id)))
}

async fn run(mut commands: mpsc::UnboundedReceiver<HubCommand>) {
    let mut state = HubState::default();
    while let Some(command) = commands.recv().await {
        match command {
            HubCommand::Ingest { message } => state.ingest(message),
            HubCommand::RegisterClient { sender, respond_to } => {
                let replay: Vec<TelemetryMessage> = state.status_cache.values().cloned().collect();
                state.clients.push(sender);
                metrics::gauge!("meshnode_connected_dashboard_clients").set(state.clients.len() as f64);
                let _ = respond_to.send(replay);
            }
            HubCommand::GetBalances { respond_to } => {
                let _ = respond_to.send(state.balances.values().cloned().collect());
            }
            HubCommand::GetSettlements { respond_to } => {
                let mut events: Vec<TelemetryMessage> = state.settlement_events.iter().cloned().collect();
                events.reverse();
                let _ = respond_to.send(events);
            }
        }
    }
}
