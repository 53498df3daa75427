//! # Connector Process Wiring
//!
//! Assembles a `ForwardingEngine` with its routing table, ledger, wallet
//! handler, BTP peer sink, and telemetry emitter out of a
//! `ResolvedConfig`, then runs it alongside the telemetry/health HTTP
//! server and the BTP listener until shutdown is requested (§5, §6).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;

use meshnode_core::PeerId;
use meshnode_forwarding::{ForwardingEngine, PaymentHandlerAdapter};
use meshnode_ledger::{BilateralLedger, NoopSettlementExecutor};
use meshnode_routing::table::{Route, RouteSource, RoutingTable};
use meshnode_store::{AuditLogger, RateLimiter, SuspiciousActivityDetector, WalletStore};
use meshnode_telemetry::TelemetryEmitter;

use crate::btp::{self, BtpPeerSink, EngineHandle};
use crate::config::ResolvedConfig;
use crate::handler::WalletPaymentHandler;

type Engine = ForwardingEngine<BtpPeerSink, WalletPaymentHandler, NoopSettlementExecutor>;

#[async_trait::async_trait]
impl EngineHandle for Engine {
    async fn process_inbound_prepare(&self, upstream: &PeerId, prepare: meshnode_core::Prepare) {
        Engine::process_inbound_prepare(self, upstream, prepare).await
    }

    async fn process_downstream_response(&self, downstream: &PeerId, response: meshnode_core::Packet) {
        Engine::process_downstream_response(self, downstream, response).await
    }
}

const RATE_LIMITER_CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

/// Run the connector until SIGINT/SIGTERM, then drain in-flight work for
/// up to `shutdown_grace_seconds` before returning.
pub async fn run(config: ResolvedConfig) -> Result<()> {
    let routing = build_routing_table(&config);
    let ledger = BilateralLedger::new();
    for peer in &config.peers {
        ledger.register(peer.peer_id.clone(), config.token.clone(), peer.credit_limit, peer.settlement_threshold);
    }

    let pool = if config.e2e_tests { None } else { meshnode_store::db::init_pool().await.context("initializing database pool")? };
    let wallets = Arc::new(match &pool {
        Some(pool) => WalletStore::postgres(pool.clone()),
        None => WalletStore::in_memory(),
    });
    let rate_limiter = Arc::new(RateLimiter::new());
    let suspicious = Arc::new(SuspiciousActivityDetector::new());
    let audit = Arc::new(match &pool {
        Some(pool) => AuditLogger::postgres(pool.clone()),
        None => AuditLogger::in_memory(),
    });
    let handler = WalletPaymentHandler::new(config.token.clone(), wallets, rate_limiter.clone(), suspicious, audit);
    let adapter = PaymentHandlerAdapter::new(config.node_id.clone(), handler);

    let sink = BtpPeerSink::new();
    let api_state = meshnode_api::AppState::new(config.node_id.clone());
    api_state.mark_degraded(pool.is_none());
    let hub = api_state.hub.clone();
    let telemetry = TelemetryEmitter::spawn(config.node_id.clone(), config.telemetry_url.clone())
        .with_local_sink(move |message| hub.ingest(message));

    let max_amounts: HashMap<PeerId, u64> = config.peers.iter().map(|p| (p.peer_id.clone(), p.max_amount)).collect();

    let engine = Arc::new(Engine::new(
        config.node_id.clone(),
        config.local_prefixes.clone(),
        routing,
        ledger,
        adapter,
        sink.clone(),
        config.token.clone(),
        telemetry,
        NoopSettlementExecutor,
        max_amounts,
    ));

    let http_listener = TcpListener::bind(("0.0.0.0", config.health_port)).await.with_context(|| format!("binding health/telemetry server to port {}", config.health_port))?;
    let btp_listener = TcpListener::bind(("0.0.0.0", config.btp_port)).await.with_context(|| format!("binding btp listener to port {}", config.btp_port))?;
    api_state.mark_ready();

    let shutdown = Arc::new(Notify::new());
    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(serve_http(http_listener, api_state, shutdown.clone())));
    tasks.push(tokio::spawn(serve_btp(btp_listener, config.clone(), sink.clone(), engine.clone())));
    tasks.push(tokio::spawn(dial_peers(config.clone(), sink, engine.clone())));
    tasks.push(tokio::spawn(deadline_sweep(engine.clone())));
    tasks.push(tokio::spawn(rate_limiter_cleanup(rate_limiter)));

    wait_for_shutdown_signal().await;
    tracing::info!(grace_seconds = config.shutdown_grace_seconds, "shutdown requested, draining in-flight work");
    shutdown.notify_waiters();
    tokio::time::sleep(std::time::Duration::from_secs(config.shutdown_grace_seconds)).await;

    for task in tasks {
        task.abort();
    }
    Ok(())
}

fn build_routing_table(config: &ResolvedConfig) -> RoutingTable {
    let mut table = RoutingTable::new();
    for route in &config.static_routes {
        table.insert(Route {
            prefix: route.prefix.clone(),
            next_hop: route.next_hop.clone(),
            priority: route.priority as i32,
            source: RouteSource::Static,
        });
    }

    let declared_peers: Vec<PeerId> = config.peers.iter().map(|p| p.peer_id.clone()).collect();
    for issue in table.validate_reachability(&declared_peers) {
        tracing::warn!(?issue, "route names a peer outside this node's declared peer set");
    }

    table
}

async fn serve_http(listener: TcpListener, state: meshnode_api::AppState, _shutdown: Arc<Notify>) -> Result<()> {
    let app = meshnode_api::router(state);
    tracing::info!("health/telemetry server listening");
    axum::serve(listener, app).await.context("health/telemetry server")?;
    Ok(())
}

async fn serve_btp(listener: TcpListener, config: ResolvedConfig, sink: BtpPeerSink, engine: Arc<Engine>) -> Result<()> {
    let tokens: HashMap<String, PeerId> = config.peers.iter().map(|p| (p.bearer_token.clone(), p.peer_id.clone())).collect();
    tracing::info!(port = config.btp_port, "btp listener bound");
    btp::serve_inbound(listener, Arc::new(tokens), sink, engine).await;
    Ok(())
}

async fn dial_peers(config: ResolvedConfig, sink: BtpPeerSink, engine: Arc<Engine>) -> Result<()> {
    let dialed: Vec<_> = config.peers.iter().filter(|p| p.dial_address.is_some()).cloned().collect();
    let mut handles = Vec::new();
    for peer in dialed {
        let token = peer.bearer_token.clone();
        handles.push(tokio::spawn(btp::maintain_outbound(peer, token, sink.clone(), engine.clone())));
    }
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

async fn deadline_sweep(engine: Arc<Engine>) -> Result<()> {
    let mut interval = tokio::time::interval(std::time::Duration::from_millis(500));
    loop {
        interval.tick().await;
        engine.run_deadline_sweep().await;
    }
}

async fn rate_limiter_cleanup(rate_limiter: Arc<RateLimiter>) -> Result<()> {
    let mut interval = tokio::time::interval(RATE_LIMITER_CLEANUP_INTERVAL);
    loop {
        interval.tick().await;
        rate_limiter.cleanup().await;
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("installing SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
