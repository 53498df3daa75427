//! # BTP Peer-Link Transport
//!
//! The length-prefixed JSON wire transport of §6: one bidirectional
//! `tokio_util::codec::LengthDelimitedCodec` connection per configured
//! peer, carrying `{type, payload}` frames for `PREPARE`/`FULFILL`/
//! `REJECT`/`HEARTBEAT`. A `HELLO {token}` frame authenticates the
//! connection on both the listener and dialer side before any packet
//! frame is accepted; `id` lives inside `payload` for every frame type
//! that already carries one (Prepare/Fulfill/Reject each do), so it is
//! not duplicated at the envelope level.
//!
//! Reconnection for outbound (dialed) links reuses the exponential
//! backoff shape of `meshnode_telemetry::TelemetryEmitter`'s reconnect
//! loop: same doubling-delay-with-jitter, persistent rather than
//! attempt-bounded.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use meshnode_core::packet::{Fulfill, Prepare, Reject};
use meshnode_core::{Packet, PeerId};
use meshnode_forwarding::{ForwardingError, PeerSink};

use crate::config::PeerLink;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const JITTER_FACTOR: f64 = 0.1;
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum BtpFrame {
    #[serde(rename = "HELLO")]
    Hello { token: String },
    #[serde(rename = "PREPARE")]
    Prepare { payload: Prepare },
    #[serde(rename = "FULFILL")]
    Fulfill { payload: Fulfill },
    #[serde(rename = "REJECT")]
    Reject { payload: Reject },
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,
}

impl From<Packet> for BtpFrame {
    fn from(packet: Packet) -> Self {
        match packet {
            Packet::Prepare(p) => BtpFrame::Prepare { payload: p },
            Packet::Fulfill(f) => BtpFrame::Fulfill { payload: f },
            Packet::Reject(r) => BtpFrame::Reject { payload: r },
        }
    }
}

/// Receives inbound packets off a BTP connection. Implemented by the
/// forwarding engine; kept as a narrow trait here so this module stays
/// generic over the engine's `PeerSink`/`PaymentHandler`/
/// `SettlementExecutor` type parameters.
#[async_trait]
pub trait EngineHandle: Send + Sync {
    async fn process_inbound_prepare(&self, upstream: &PeerId, prepare: Prepare);
    async fn process_downstream_response(&self, downstream: &PeerId, response: Packet);
}

/// A `PeerSink` backed by live BTP connections. Each connected peer
/// registers an outbound channel that the connection's writer task
/// drains; a peer with no live connection yields a send failure that
/// the forwarding engine turns into a `T01` reject.
#[derive(Default, Clone)]
pub struct BtpPeerSink {
    outboxes: Arc<StdMutex<HashMap<PeerId, mpsc::UnboundedSender<Packet>>>>,
}

impl BtpPeerSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, peer: PeerId, tx: mpsc::UnboundedSender<Packet>) {
        self.outboxes.lock().expect("btp outbox lock poisoned").insert(peer, tx);
    }

    fn unregister(&self, peer: &PeerId) {
        self.outboxes.lock().expect("btp outbox lock poisoned").remove(peer);
    }
}

#[async_trait]
impl PeerSink for BtpPeerSink {
    async fn send(&self, peer: &PeerId, packet: Packet) -> Result<(), ForwardingError> {
        let tx = self.outboxes.lock().expect("btp outbox lock poisoned").get(peer).cloned();
        match tx {
            Some(tx) => tx.send(packet).map_err(|_| ForwardingError::PeerSend(format!("peer {peer} outbox closed"))),
            None => Err(ForwardingError::PeerSend(format!("no live connection to peer {peer}"))),
        }
    }
}

/// Accept inbound BTP connections on `listener` for the lifetime of the
/// process. Each connection authenticates via its first `HELLO` frame
/// against `tokens` (bearer token to peer identity) before being wired
/// into `sink` and `engine`.
pub async fn serve_inbound(
    listener: TcpListener,
    tokens: Arc<HashMap<String, PeerId>>,
    sink: BtpPeerSink,
    engine: Arc<dyn EngineHandle>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!(%err, "btp listener accept failed");
                continue;
            }
        };
        let tokens = tokens.clone();
        let sink = sink.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_inbound_connection(stream, tokens, sink, engine).await {
                tracing::warn!(%err, %addr, "btp connection ended");
            }
        });
    }
}

async fn handle_inbound_connection(
    stream: TcpStream,
    tokens: Arc<HashMap<String, PeerId>>,
    sink: BtpPeerSink,
    engine: Arc<dyn EngineHandle>,
) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    let first = framed.next().await.ok_or_else(|| anyhow::anyhow!("connection closed before handshake"))??;
    let peer = match serde_json::from_slice::<BtpFrame>(&first)? {
        BtpFrame::Hello { token } => tokens.get(&token).cloned().ok_or_else(|| anyhow::anyhow!("unrecognized bearer token"))?,
        _ => anyhow::bail!("first frame was not HELLO"),
    };
    run_connection(framed, peer, sink, engine).await;
    Ok(())
}

/// Dial and maintain one outbound BTP connection for the lifetime of
/// the process, reconnecting with backoff on every drop.
pub async fn maintain_outbound(peer: PeerLink, own_token: String, sink: BtpPeerSink, engine: Arc<dyn EngineHandle>) {
    let Some(address) = peer.dial_address.clone() else { return };
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                backoff = INITIAL_BACKOFF;
                let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
                let hello = serde_json::to_vec(&BtpFrame::Hello { token: own_token.clone() }).expect("hello frame serializes");
                if let Err(err) = framed.send(hello.into()).await {
                    tracing::warn!(%err, peer = %peer.peer_id, "btp dial handshake failed");
                } else {
                    run_connection(framed, peer.peer_id.clone(), sink.clone(), engine.clone()).await;
                }
            }
            Err(err) => {
                tracing::warn!(%err, peer = %peer.peer_id, %address, "btp dial failed, retrying");
            }
        }
        tokio::time::sleep(jittered(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Drive one authenticated connection until it drops: a writer task
/// drains `rx` (packets the engine wants sent to `peer`, plus periodic
/// heartbeats) while the current task reads inbound frames and
/// dispatches them to `engine`.
async fn run_connection(framed: Framed<TcpStream, LengthDelimitedCodec>, peer: PeerId, sink: BtpPeerSink, engine: Arc<dyn EngineHandle>) {
    let (mut write, mut read) = framed.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Packet>();
    sink.register(peer.clone(), tx);

    let writer = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                packet = rx.recv() => {
                    let Some(packet) = packet else { break };
                    let frame = BtpFrame::from(packet);
                    let Ok(bytes) = serde_json::to_vec(&frame) else { continue };
                    if write.send(bytes.into()).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    let Ok(bytes) = serde_json::to_vec(&BtpFrame::Heartbeat) else { continue };
                    if write.send(bytes.into()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(frame) = read.next().await {
        let frame = match frame {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(%err, %peer, "btp read failed, closing connection");
                break;
            }
        };
        match serde_json::from_slice::<BtpFrame>(&frame) {
            Ok(BtpFrame::Prepare { payload }) => engine.process_inbound_prepare(&peer, payload).await,
            Ok(BtpFrame::Fulfill { payload }) => engine.process_downstream_response(&peer, Packet::Fulfill(payload)).await,
            Ok(BtpFrame::Reject { payload }) => engine.process_downstream_response(&peer, Packet::Reject(payload)).await,
            Ok(BtpFrame::Heartbeat) => tracing::trace!(%peer, "heartbeat"),
            Ok(BtpFrame::Hello { .. }) => tracing::warn!(%peer, "unexpected HELLO after handshake, dropping"),
            Err(err) => tracing::warn!(%err, %peer, "malformed btp frame, dropping"),
        }
    }

    sink.unregister(&peer);
    writer.abort();
}

fn jittered(base: Duration) -> Duration {
    let base_millis = base.as_millis() as f64;
    let spread = base_millis * JITTER_FACTOR;
    let delta = rand::thread_rng().gen_range(-spread..=spread);
    let millis = (base_millis + delta).max(0.0);
    Duration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trips_through_json() {
        let prepare = Prepare {
            id: meshnode_core::PacketId::from_bytes([4u8; 16]),
            destination: meshnode_core::Address::parse("g.a").unwrap(),
            amount: 10,
            execution_condition: meshnode_crypto::sha256_bytes(b"x"),
            expires_at: meshnode_core::Timestamp::now(),
            data: b"x".to_vec(),
        };
        let frame = BtpFrame::from(Packet::Prepare(prepare));
        let bytes = serde_json::to_vec(&frame).unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("\"type\":\"PREPARE\""));
        let parsed: BtpFrame = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(parsed, BtpFrame::Prepare { .. }));
    }

    #[test]
    fn unregistered_peer_send_fails() {
        let sink = BtpPeerSink::new();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(sink.send(
            &PeerId::new("ghost"),
            Packet::Reject(meshnode_core::reject_from_here(
                meshnode_core::PacketId::from_bytes([1u8; 16]),
                meshnode_core::ErrorCode::F02,
                "no route",
                &meshnode_core::NodeId::new("n"),
            )),
        ));
        assert!(result.is_err());
    }

    #[test]
    fn jitter_stays_within_ten_percent() {
        for _ in 0..50 {
            let delay = jittered(Duration::from_secs(1));
            assert!(delay.as_millis() >= 900 && delay.as_millis() <= 1100);
        }
    }
}
