//! # Forwarding Engine
//!
//! Implements the packet state machine and forwarding steps of §4.3:
//! validate, check expiry, classify the destination as local or
//! transit, resolve the next hop, check downstream capacity, forward,
//! and correlate the eventual Fulfill/Reject back to the upstream peer.
//!
//! The pending-prepare map is sharded by downstream peer (§5): each
//! shard is an independently locked `HashMap`, so a hop on one peer
//! link never contends with a hop on another.

use std::collections::HashMap;
use std::sync::RwLock as StdRwLock;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use base64::Engine as _;
use thiserror::Error;

use meshnode_core::{
    reject_from_here, Address, ErrorCode, ExecutionDigest, NodeId, Packet, PacketId, PeerId, Reject, TokenId,
    Timestamp,
};
use meshnode_core::packet::{Fulfill, Prepare};
use meshnode_crypto::matches_condition;
use meshnode_ledger::{BilateralLedger, SettlementExecutor};
use meshnode_routing::RoutingTable;
use meshnode_state::PendingPrepare;
use meshnode_telemetry::{TelemetryEmitter, TelemetryEventType};

use crate::handler::{DispatchOutcome, PaymentHandler, PaymentHandlerAdapter};

/// Sends a packet to a connected peer. Implemented by the peer-link
/// transport; tests use an in-memory stand-in.
#[async_trait]
pub trait PeerSink: Send + Sync {
    async fn send(&self, peer: &PeerId, packet: Packet) -> Result<(), ForwardingError>;
}

#[derive(Debug, Error)]
pub enum ForwardingError {
    #[error("no route to destination")]
    NoRoute,
    #[error("peer send failed: {0}")]
    PeerSend(String),
    #[error("no pending-prepare entry for id on peer {0}")]
    UnknownCorrelation(PeerId),
}

/// Bookkeeping kept alongside the spec's `PendingPrepare` state machine:
/// the original execution condition and settlement token, needed to
/// verify the eventual Fulfill and commit the ledger hop. `PendingPrepare`
/// itself carries only the fields named in the data model (§3).
struct ForwardedHop {
    pending: PendingPrepare,
    condition: ExecutionDigest,
    token: TokenId,
}

#[derive(Default)]
struct PendingStore {
    shards: StdRwLock<HashMap<PeerId, StdMutex<HashMap<PacketId, ForwardedHop>>>>,
}

impl PendingStore {
    fn insert(&self, downstream: PeerId, hop: ForwardedHop) {
        let id = hop.pending.id;
        {
            let shards = self.shards.read().expect("pending shards lock poisoned");
            if let Some(shard) = shards.get(&downstream) {
                shard.lock().expect("pending shard lock poisoned").insert(id, hop);
                return;
            }
        }
        let mut shards = self.shards.write().expect("pending shards lock poisoned");
        shards
            .entry(downstream)
            .or_default()
            .lock()
            .expect("pending shard lock poisoned")
            .insert(id, hop);
    }

    fn take(&self, downstream: &PeerId, id: &PacketId) -> Option<ForwardedHop> {
        let shards = self.shards.read().expect("pending shards lock poisoned");
        shards.get(downstream).and_then(|shard| shard.lock().expect("pending shard lock poisoned").remove(id))
    }

    /// Remove and return every entry whose deadline has passed, for the
    /// deadline monitor (§5 "cancellation and timeouts").
    fn sweep_expired(&self, now: &Timestamp) -> Vec<(PeerId, ForwardedHop)> {
        let shards = self.shards.read().expect("pending shards lock poisoned");
        let mut expired = Vec::new();
        for (peer, shard) in shards.iter() {
            let mut shard = shard.lock().expect("pending shard lock poisoned");
            let expired_ids: Vec<PacketId> = shard
                .values()
                .filter(|hop| hop.pending.is_expired(now))
                .map(|hop| hop.pending.id)
                .collect();
            for id in expired_ids {
                if let Some(hop) = shard.remove(&id) {
                    expired.push((peer.clone(), hop));
                }
            }
        }
        expired
    }
}

/// The packet-forwarding engine for one connector node.
pub struct ForwardingEngine<S: PeerSink, H: PaymentHandler, E: SettlementExecutor> {
    here: NodeId,
    local_prefixes: Vec<Address>,
    routing: StdRwLock<RoutingTable>,
    ledger: BilateralLedger,
    pending: PendingStore,
    handler: PaymentHandlerAdapter<H>,
    peer_sink: S,
    token: TokenId,
    telemetry: TelemetryEmitter,
    settlement: E,
    /// Agreed per-link maximum Prepare amount, keyed by upstream peer.
    max_amounts: HashMap<PeerId, u64>,
}

impl<S: PeerSink, H: PaymentHandler, E: SettlementExecutor> ForwardingEngine<S, H, E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        here: NodeId,
        local_prefixes: Vec<Address>,
        routing: RoutingTable,
        ledger: BilateralLedger,
        handler: PaymentHandlerAdapter<H>,
        peer_sink: S,
        token: TokenId,
        telemetry: TelemetryEmitter,
        settlement: E,
        max_amounts: HashMap<PeerId, u64>,
    ) -> Self {
        Self {
            here,
            local_prefixes,
            routing: StdRwLock::new(routing),
            ledger,
            pending: PendingStore::default(),
            handler,
            peer_sink,
            token,
            telemetry,
            settlement,
            max_amounts,
        }
    }

    fn emit(&self, event_type: TelemetryEventType, data: serde_json::Value) {
        self.telemetry.emit(event_type, data);
    }

    pub fn routing(&self) -> &StdRwLock<RoutingTable> {
        &self.routing
    }

    pub fn ledger(&self) -> &BilateralLedger {
        &self.ledger
    }

    fn is_local_destination(&self, destination: &Address) -> bool {
        self.local_prefixes.iter().any(|prefix| prefix.is_prefix_of(destination))
    }

    /// Handle an inbound Prepare from upstream peer `U` (§4.3 steps 1-6).
    /// Returns `Some` when the outcome is immediately known (expiry
    /// reject, no-route reject, capacity reject, or a local handler
    /// result); returns `None` when the Prepare was forwarded downstream
    /// and the caller should await the correlated response via
    /// `complete_hop`.
    pub async fn handle_inbound_prepare(&self, upstream: &PeerId, prepare: Prepare) -> Option<Packet> {
        self.emit(
            TelemetryEventType::PacketReceived,
            serde_json::json!({"packetId": prepare.id, "peerId": upstream, "destination": prepare.destination}),
        );

        if let Some(max_amount) = self.max_amounts.get(upstream) {
            if prepare.amount > *max_amount {
                return Some(Packet::Reject(reject_from_here(
                    prepare.id,
                    ErrorCode::F03,
                    "amount exceeds agreed maximum on this link",
                    &self.here,
                )));
            }
        }

        let now = Timestamp::now();
        if now.is_at_or_after(&prepare.expires_at) {
            return Some(Packet::Reject(reject_from_here(
                prepare.id,
                ErrorCode::R00,
                "expired at ingress",
                &self.here,
            )));
        }

        if self.is_local_destination(&prepare.destination) {
            let outcome = self
                .handler
                .dispatch(prepare.id, prepare.destination.clone(), prepare.amount, prepare.expires_at, prepare.data.clone())
                .await;
            self.emit(
                TelemetryEventType::PacketSent,
                serde_json::json!({"packetId": prepare.id, "target": "handler", "destination": prepare.destination}),
            );
            return Some(match outcome {
                DispatchOutcome::Fulfill(f) => Packet::Fulfill(f),
                DispatchOutcome::Reject(r) => Packet::Reject(r),
            });
        }

        let downstream = {
            let routing = self.routing.read().expect("routing lock poisoned");
            routing.lookup(&prepare.destination).cloned()
        };
        let Some(downstream) = downstream else {
            return Some(Packet::Reject(reject_from_here(
                prepare.id,
                ErrorCode::F02,
                "no route to destination",
                &self.here,
            )));
        };

        let admits = self.ledger.would_admit(&downstream, &self.token, prepare.amount).unwrap_or(false);
        if !admits {
            return Some(Packet::Reject(reject_from_here(
                prepare.id,
                ErrorCode::T04,
                "insufficient downstream liquidity",
                &self.here,
            )));
        }

        let pending = PendingPrepare::new(prepare.id, upstream.clone(), downstream.clone(), prepare.amount, prepare.expires_at);
        self.pending.insert(
            downstream.clone(),
            ForwardedHop {
                pending,
                condition: prepare.execution_condition,
                token: self.token.clone(),
            },
        );

        let forwarded = Prepare {
            id: prepare.id,
            destination: prepare.destination.clone(),
            amount: prepare.amount,
            execution_condition: prepare.execution_condition,
            expires_at: prepare.expires_at,
            data: prepare.data.clone(),
        };
        if let Err(err) = self.peer_sink.send(&downstream, Packet::Prepare(forwarded)).await {
            self.pending.take(&downstream, &prepare.id);
            tracing::warn!(%err, peer = %downstream, "failed to forward prepare downstream");
            return Some(Packet::Reject(reject_from_here(prepare.id, ErrorCode::T01, "downstream peer unreachable", &self.here)));
        }
        self.emit(
            TelemetryEventType::PacketSent,
            serde_json::json!({"packetId": prepare.id, "peerId": downstream}),
        );

        None
    }

    /// Correlate a Fulfill or Reject arriving from downstream peer `D`
    /// with its `PendingPrepare`, commit the ledger hop on a verified
    /// Fulfill, and return the upstream peer plus the packet to relay to
    /// it (§4.3 step 7).
    pub async fn complete_hop(&self, downstream: &PeerId, response: Packet) -> Result<(PeerId, Packet), ForwardingError> {
        let id = response.id();
        let hop = self
            .pending
            .take(downstream, &id)
            .ok_or_else(|| ForwardingError::UnknownCorrelation(downstream.clone()))?;
        let upstream = hop.pending.upstream_peer.clone();

        let packet = match response {
            Packet::Fulfill(fulfill) => self.complete_fulfill(hop, fulfill).await?,
            Packet::Reject(reject) => self.complete_reject(hop, reject),
            Packet::Prepare(_) => return Err(ForwardingError::UnknownCorrelation(downstream.clone())),
        };
        Ok((upstream, packet))
    }

    async fn complete_fulfill(&self, hop: ForwardedHop, fulfill: Fulfill) -> Result<Packet, ForwardingError> {
        if !matches_condition(fulfill.fulfillment_bytes(), &hop.condition) {
            tracing::warn!(id = ?fulfill.id, "fulfillment does not match execution condition, converting to F99");
            return Ok(Packet::Reject(reject_from_here(fulfill.id, ErrorCode::F99, "fulfillment mismatch", &self.here)));
        }

        match self.ledger.apply_hop(&hop.pending.upstream_peer, &hop.pending.downstream_peer, &hop.token, hop.pending.amount) {
            Ok(outcome) if outcome.downstream_triggered_settlement => {
                self.run_settlement(&hop.pending.downstream_peer, &hop.token).await;
            }
            Ok(_) => {}
            Err(err) => tracing::warn!(%err, "failed to commit ledger hop after verified fulfill"),
        }

        Ok(Packet::Fulfill(fulfill))
    }

    /// Drive one account through the settlement lifecycle (§4.5 steps
    /// 2-3): emit `SETTLEMENT_TRIGGERED`, hand the request to the
    /// external executor, and on acknowledgment emit
    /// `SETTLEMENT_COMPLETED`. A queued "pending follow-up" re-triggers
    /// this same sequence immediately rather than waiting for the next
    /// hop to cross the threshold again.
    async fn run_settlement(&self, peer: &PeerId, token: &TokenId) {
        loop {
            let net_balance = self.ledger.net_balance(peer, token).unwrap_or(0);
            self.emit(
                TelemetryEventType::SettlementTriggered,
                serde_json::json!({"peerId": peer, "tokenId": token, "netBalance": net_balance}),
            );

            if let Err(err) = self.ledger.begin_settling(peer, token) {
                tracing::warn!(%err, %peer, "failed to enter settling state");
                return;
            }

            let amount = net_balance.unsigned_abs();
            let success = self.settlement.settle(peer, token, amount).await;
            if !success {
                tracing::warn!(%peer, "settlement executor reported failure");
                return;
            }

            let retriggered = match self.ledger.acknowledge_settlement(peer, token, amount) {
                Ok(retriggered) => retriggered,
                Err(err) => {
                    tracing::warn!(%err, %peer, "failed to acknowledge settlement");
                    return;
                }
            };
            self.emit(
                TelemetryEventType::SettlementCompleted,
                serde_json::json!({"peerId": peer, "tokenId": token, "success": true, "settledAmount": amount}),
            );

            if !retriggered {
                return;
            }
        }
    }

    fn complete_reject(&self, hop: ForwardedHop, reject: Reject) -> Packet {
        if reject.triggered_by.as_str() != hop.pending.downstream_peer.as_str() {
            return Packet::Reject(reject);
        }
        Packet::Reject(Reject {
            triggered_by: self.here.clone(),
            ..reject
        })
    }

    /// Handle an inbound Prepare and relay any immediately-known outcome
    /// back to `upstream` itself, via the engine's own `PeerSink`. Use
    /// this from a peer-link read loop instead of `handle_inbound_prepare`
    /// when the caller has no other way to address the upstream peer.
    pub async fn process_inbound_prepare(&self, upstream: &PeerId, prepare: Prepare) {
        if let Some(packet) = self.handle_inbound_prepare(upstream, prepare).await {
            let id = packet.id();
            if let Err(err) = self.peer_sink.send(upstream, packet).await {
                tracing::warn!(%err, peer = %upstream, "failed to relay immediate outcome upstream");
                return;
            }
            self.emit(TelemetryEventType::PacketSent, serde_json::json!({"packetId": id, "peerId": upstream}));
        }
    }

    /// Correlate a Fulfill/Reject arriving from `downstream` and relay the
    /// resulting packet to the hop's original upstream peer via the
    /// engine's own `PeerSink`.
    pub async fn process_downstream_response(&self, downstream: &PeerId, response: Packet) {
        match self.complete_hop(downstream, response).await {
            Ok((upstream, packet)) => {
                if let Err(err) = self.peer_sink.send(&upstream, packet).await {
                    tracing::warn!(%err, peer = %upstream, "failed to relay correlated response upstream");
                }
            }
            Err(err) => tracing::warn!(%err, peer = %downstream, "failed to correlate downstream response"),
        }
    }

    /// Sweep pending prepares past their deadline, synthesizing R00
    /// rejects upstream for each. Intended to run on a periodic timer.
    pub async fn run_deadline_sweep(&self) {
        let now = Timestamp::now();
        let expired = self.pending.sweep_expired(&now);
        for (_downstream, hop) in expired {
            let reject = Packet::Reject(reject_from_here(hop.pending.id, ErrorCode::R00, "deadline exceeded", &self.here));
            if let Err(err) = self.peer_sink.send(&hop.pending.upstream_peer, reject).await {
                tracing::warn!(%err, peer = %hop.pending.upstream_peer, "failed to deliver deadline reject upstream");
            }
        }
    }
}
