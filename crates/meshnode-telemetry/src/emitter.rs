//! # Telemetry Emitter
//!
//! The connector-side outbound stream of typed events (§4.10, §2.12). A
//! background task owns a persistent WebSocket connection to the
//! telemetry server; `emit()` itself never blocks or fails — it pushes
//! onto a bounded drop-oldest buffer that the background task drains.
//!
//! Reconnect uses exponential backoff, adapted from the HTTP retry loop
//! used elsewhere in this codebase: same doubling-delay shape, but
//! persistent rather than attempt-bounded, since a telemetry connection
//! is expected to stay up for the life of the connector.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio_tungstenite::tungstenite::Message;

use meshnode_core::NodeId;

use crate::message::{TelemetryEventType, TelemetryMessage};

const MAX_BUFFERED_MESSAGES: usize = 10_000;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const JITTER_FACTOR: f64 = 0.1;
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Bounded FIFO buffer that drops the oldest entry rather than blocking
/// or rejecting once full.
#[derive(Default)]
struct DropOldestBuffer {
    entries: VecDeque<TelemetryMessage>,
}

impl DropOldestBuffer {
    fn push(&mut self, message: TelemetryMessage) {
        if self.entries.len() >= MAX_BUFFERED_MESSAGES {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    fn pop(&mut self) -> Option<TelemetryMessage> {
        self.entries.pop_front()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Handle to the connector's telemetry stream. Cheap to clone; cloning
/// shares the same underlying buffer and background task.
#[derive(Clone)]
pub struct TelemetryEmitter {
    node_id: NodeId,
    buffer: Option<Arc<Mutex<DropOldestBuffer>>>,
    local_sink: Option<Arc<dyn Fn(TelemetryMessage) + Send + Sync>>,
}

impl TelemetryEmitter {
    /// A no-op emitter for when `--telemetry-url` is empty.
    pub fn disabled(node_id: NodeId) -> Self {
        Self { node_id, buffer: None, local_sink: None }
    }

    /// Spawn the background reconnect-and-drain task and return a handle.
    /// An empty `url` yields a disabled emitter instead of spawning.
    pub fn spawn(node_id: NodeId, url: String) -> Self {
        if url.is_empty() {
            return Self::disabled(node_id);
        }
        let buffer = Arc::new(Mutex::new(DropOldestBuffer::default()));
        tokio::spawn(run(url, buffer.clone()));
        Self {
            node_id,
            buffer: Some(buffer),
            local_sink: None,
        }
    }

    /// Attach a callback that receives every emitted message in-process,
    /// independent of whether an outbound connection is configured. The
    /// connector uses this to feed its own locally-served telemetry view
    /// (health/balances/settlements) from the same event stream that
    /// `--telemetry-url` fans out to a remote dashboard aggregator.
    pub fn with_local_sink(mut self, sink: impl Fn(TelemetryMessage) + Send + Sync + 'static) -> Self {
        self.local_sink = Some(Arc::new(sink));
        self
    }

    /// Enqueue an event. Best-effort: never blocks, never fails visibly.
    pub fn emit(&self, event_type: TelemetryEventType, data: serde_json::Value) {
        if self.buffer.is_none() && self.local_sink.is_none() {
            return;
        }
        let message = TelemetryMessage::new(event_type, self.node_id.clone(), data);
        if let Some(sink) = &self.local_sink {
            sink(message.clone());
        }
        if let Some(buffer) = &self.buffer {
            buffer.lock().expect("telemetry buffer lock poisoned").push(message);
        }
    }

    /// Number of messages currently buffered awaiting send. Exposed for
    /// tests and health reporting, not part of the reconnect protocol.
    pub fn pending(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.lock().expect("telemetry buffer lock poisoned").len())
    }
}

async fn run(url: String, buffer: Arc<Mutex<DropOldestBuffer>>) {
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match tokio_tungstenite::connect_async(&url).await {
            Ok((stream, _response)) => {
                backoff = INITIAL_BACKOFF;
                let (mut write, mut read) = stream.split();
                loop {
                    let next = { buffer.lock().expect("telemetry buffer lock poisoned").pop() };
                    match next {
                        Some(message) => {
                            let payload = match serde_json::to_string(&message) {
                                Ok(p) => p,
                                Err(err) => {
                                    tracing::warn!(%err, "failed to serialize telemetry message, dropping");
                                    continue;
                                }
                            };
                            if let Err(err) = write.send(Message::Text(payload)).await {
                                tracing::warn!(%err, %url, "telemetry send failed, reconnecting");
                                break;
                            }
                        }
                        None => {
                            tokio::select! {
                                _ = tokio::time::sleep(DRAIN_POLL_INTERVAL) => {}
                                incoming = read.next() => {
                                    if !matches!(incoming, Some(Ok(_))) {
                                        tracing::warn!(%url, "telemetry connection closed, reconnecting");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(%err, %url, delay_ms = backoff.as_millis() as u64, "telemetry connect failed, retrying");
            }
        }
        tokio::time::sleep(jittered(backoff)).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

/// Applies up to ±10% jitter to a backoff delay so many reconnecting
/// connectors don't retry in lockstep.
fn jittered(base: Duration) -> Duration {
    let base_millis = base.as_millis() as f64;
    let spread = base_millis * JITTER_FACTOR;
    let delta = rand::thread_rng().gen_range(-spread..=spread);
    let millis = (base_millis + delta).max(0.0);
    Duration::from_millis(millis as u64)
}
