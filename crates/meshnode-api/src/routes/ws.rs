//! # Telemetry WebSocket Endpoint
//!
//! A single endpoint serves both connection roles, disambiguated by the
//! first message (§4.9, §6): a connector's first message is a
//! `TelemetryMessage` carrying `nodeId`; a dashboard client's first
//! message is `{"type": "CLIENT_CONNECT"}`.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;

use tokio::sync::mpsc;

use meshnode_telemetry::TelemetryMessage;

use crate::state::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Reads messages until one disambiguates the connection's role, then
/// hands off to the matching loop. A malformed message before that point
/// is dropped with a warning rather than closing the socket (§6).
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    loop {
        let Some(Ok(msg)) = socket.recv().await else {
            return;
        };
        let Message::Text(text) = msg else { continue };

        let value: serde_json::Value = match serde_json::from_str(text.as_str()) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(%err, "dropping malformed telemetry message");
                continue;
            }
        };

        if value.get("type").and_then(|t| t.as_str()) == Some("CLIENT_CONNECT") {
            return handle_client(socket, state).await;
        }

        match serde_json::from_value::<TelemetryMessage>(value) {
            Ok(message) => return handle_connector(socket, state, message).await,
            Err(err) => tracing::warn!(%err, "dropping malformed telemetry message"),
        }
    }
}

async fn handle_connector(mut socket: WebSocket, state: AppState, first: TelemetryMessage) {
    state.hub.ingest(first);
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        match serde_json::from_str::<TelemetryMessage>(text.as_str()) {
            Ok(message) => state.hub.ingest(message),
            Err(err) => tracing::warn!(%err, "dropping malformed telemetry message"),
        }
    }
}

async fn handle_client(mut socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    let replay = state.hub.register_client(sender).await;

    for message in replay {
        let Ok(payload) = serde_json::to_string(&message) else { continue };
        if socket.send(Message::Text(payload.into())).await.is_err() {
            return;
        }
    }

    while let Some(message) = receiver.recv().await {
        let Ok(payload) = serde_json::to_string(&message) else { continue };
        if socket.send(Message::Text(payload.into())).await.is_err() {
            break;
        }
    }
}

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/ws", axum::routing::get(upgrade))
}
