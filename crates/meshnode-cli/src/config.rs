//! # Topology Configuration
//!
//! Connector topology — peer links, local-terminating prefixes, static
//! routes, credit limits, settlement thresholds — loaded from the YAML
//! file named by `--config` (§12). `resolve` applies the precedence
//! order CLI flag > environment variable > config file > built-in
//! default for every field that can come from more than one source.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use meshnode_core::{Address, NodeId, PeerId, TokenId};

use crate::cli::{Cli, LogLevel};

const DEFAULT_BTP_PORT: u16 = 3000;
const DEFAULT_HEALTH_PORT: u16 = 8080;
const DEFAULT_SHUTDOWN_GRACE_SECONDS: u64 = 30;
const DEFAULT_TOKEN: &str = "usd";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    node_id: Option<String>,
    btp_port: Option<u16>,
    health_port: Option<u16>,
    log_level: Option<String>,
    telemetry_url: Option<String>,
    token: Option<String>,
    shutdown_grace_seconds: Option<u64>,
    #[serde(default)]
    local_prefixes: Vec<String>,
    #[serde(default)]
    static_routes: Vec<FileRoute>,
    #[serde(default)]
    peers: Vec<FilePeer>,
}

#[derive(Debug, Deserialize)]
struct FileRoute {
    prefix: String,
    next_hop: String,
    #[serde(default)]
    priority: u32,
}

#[derive(Debug, Deserialize)]
struct FilePeer {
    peer_id: String,
    #[serde(default = "default_credit_limit")]
    credit_limit: u64,
    #[serde(default = "default_settlement_threshold")]
    settlement_threshold: u64,
    /// Address to dial for an outbound BTP connection. Absent means this
    /// peer is expected to dial us instead.
    dial_address: Option<String>,
    bearer_token: String,
    /// Largest amount this link has agreed to accept in a single Prepare.
    /// A Prepare above this is rejected before the expiry/routing checks
    /// even run (§4.3 step 1).
    #[serde(default = "default_max_amount")]
    max_amount: u64,
}

fn default_credit_limit() -> u64 {
    10_000
}

fn default_settlement_threshold() -> u64 {
    8_000
}

fn default_max_amount() -> u64 {
    1_000_000
}

/// One statically configured route toward a peer.
#[derive(Debug, Clone)]
pub struct StaticRoute {
    pub prefix: Address,
    pub next_hop: PeerId,
    pub priority: u32,
}

/// One configured bilateral peer link.
#[derive(Debug, Clone)]
pub struct PeerLink {
    pub peer_id: PeerId,
    pub credit_limit: u64,
    pub settlement_threshold: u64,
    pub dial_address: Option<String>,
    pub bearer_token: String,
    /// Agreed maximum amount for a single inbound Prepare on this link.
    pub max_amount: u64,
}

/// Fully resolved connector configuration, ready to wire into a running
/// process.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub node_id: NodeId,
    pub btp_port: u16,
    pub health_port: u16,
    pub log_level: LogLevel,
    pub telemetry_url: String,
    pub token: TokenId,
    pub shutdown_grace_seconds: u64,
    pub local_prefixes: Vec<Address>,
    pub static_routes: Vec<StaticRoute>,
    pub peers: Vec<PeerLink>,
    /// `E2E_TESTS` — forces every store onto its in-memory backend
    /// regardless of `DATABASE_URL`, for deterministic scenario tests.
    pub e2e_tests: bool,
}

/// Load the config file (if named) and merge it with CLI flags and
/// environment variables under the documented precedence.
pub fn resolve(cli: Cli) -> Result<ResolvedConfig> {
    let file = match &cli.config {
        Some(path) => load_file(path)?,
        None => FileConfig::default(),
    };

    let node_id = cli
        .node_id
        .or_else(|| std::env::var("NODE_ID").ok())
        .or(file.node_id)
        .context("node id must be set via --node-id, NODE_ID, or the config file")?;

    let btp_port = resolve_u16(cli.btp_port, "BTP_PORT", file.btp_port, DEFAULT_BTP_PORT)?;
    let health_port = resolve_u16(cli.health_port, "HEALTH_CHECK_PORT", file.health_port, DEFAULT_HEALTH_PORT)?;

    let log_level = match cli.log_level {
        Some(level) => level,
        None => match std::env::var("LOG_LEVEL").ok().or(file.log_level) {
            Some(raw) => raw.parse().map_err(anyhow::Error::msg).context("invalid log level")?,
            None => LogLevel::Info,
        },
    };

    let telemetry_url = cli
        .telemetry_url
        .or_else(|| std::env::var("DASHBOARD_TELEMETRY_URL").ok())
        .or(file.telemetry_url)
        .unwrap_or_default();

    let token = TokenId::new(file.token.unwrap_or_else(|| DEFAULT_TOKEN.to_string()));
    let shutdown_grace_seconds = file.shutdown_grace_seconds.unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECONDS);

    let local_prefixes = file
        .local_prefixes
        .into_iter()
        .map(|raw| Address::parse(raw.clone()).with_context(|| format!("invalid local-terminating prefix '{raw}'")))
        .collect::<Result<Vec<_>>>()?;

    let peers: Vec<PeerLink> = file
        .peers
        .into_iter()
        .map(|p| PeerLink {
            peer_id: PeerId::new(p.peer_id),
            credit_limit: p.credit_limit,
            settlement_threshold: p.settlement_threshold,
            dial_address: p.dial_address,
            bearer_token: p.bearer_token,
            max_amount: p.max_amount,
        })
        .collect();

    let declared_peers: Vec<PeerId> = peers.iter().map(|p| p.peer_id.clone()).collect();
    let static_routes = file
        .static_routes
        .into_iter()
        .map(|r| {
            let prefix = Address::parse(r.prefix.clone()).with_context(|| format!("invalid route prefix '{}'", r.prefix))?;
            let next_hop = PeerId::new(r.next_hop);
            if !declared_peers.contains(&next_hop) {
                anyhow::bail!("route for '{}' names undeclared peer '{}'", prefix.as_str(), next_hop);
            }
            Ok(StaticRoute { prefix, next_hop, priority: r.priority })
        })
        .collect::<Result<Vec<_>>>()?;

    let e2e_tests = std::env::var("E2E_TESTS").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);

    Ok(ResolvedConfig {
        node_id: NodeId::new(node_id),
        btp_port,
        health_port,
        log_level,
        telemetry_url,
        token,
        shutdown_grace_seconds,
        local_prefixes,
        static_routes,
        peers,
        e2e_tests,
    })
}

fn resolve_u16(flag: Option<u16>, env_var: &str, file: Option<u16>, default: u16) -> Result<u16> {
    if let Some(v) = flag {
        return Ok(v);
    }
    if let Ok(raw) = std::env::var(env_var) {
        return raw.parse().with_context(|| format!("{env_var} is not a valid port number"));
    }
    Ok(file.unwrap_or(default))
}

fn load_file(path: &Path) -> Result<FileConfig> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            config: None,
            node_id: Some("node-a".to_string()),
            btp_port: None,
            health_port: None,
            log_level: None,
            telemetry_url: None,
        }
    }

    #[test]
    fn defaults_apply_when_nothing_else_is_set() {
        let resolved = resolve(base_cli()).unwrap();
        assert_eq!(resolved.btp_port, DEFAULT_BTP_PORT);
        assert_eq!(resolved.health_port, DEFAULT_HEALTH_PORT);
        assert_eq!(resolved.token, TokenId::new(DEFAULT_TOKEN));
        assert!(resolved.peers.is_empty());
    }

    #[test]
    fn cli_flag_overrides_everything() {
        let mut cli = base_cli();
        cli.btp_port = Some(9999);
        let resolved = resolve(cli).unwrap();
        assert_eq!(resolved.btp_port, 9999);
    }

    #[test]
    fn missing_node_id_is_a_configuration_error() {
        let cli = Cli {
            config: None,
            node_id: None,
            btp_port: None,
            health_port: None,
            log_level: None,
            telemetry_url: None,
        };
        assert!(std::env::var("NODE_ID").is_err());
        assert!(resolve(cli).is_err());
    }
}
