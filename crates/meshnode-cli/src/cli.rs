//! # Command-Line Arguments
//!
//! Flags accepted by the `meshnode` binary (§6). Every flag has an
//! environment-variable fallback and a config-file fallback resolved in
//! `config::resolve` — this module only owns argument parsing and the
//! `--log-level` vocabulary.

use std::path::PathBuf;

use clap::Parser;

/// meshnode — a settlement connector that forwards value-bearing
/// request/response packets between peers and terminates them against a
/// local payment handler.
#[derive(Parser, Debug)]
#[command(name = "meshnode", version, about, long_about = None)]
pub struct Cli {
    /// Path to the connector's YAML topology configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// This node's identifier. Overrides `NODE_ID` and the config file.
    #[arg(long)]
    pub node_id: Option<String>,

    /// Port the BTP peer-link listener binds to.
    #[arg(long)]
    pub btp_port: Option<u16>,

    /// Port the health/metrics/telemetry-hub HTTP server binds to.
    #[arg(long)]
    pub health_port: Option<u16>,

    /// Structured logging verbosity.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// WebSocket URL of a remote telemetry aggregator. Empty disables
    /// outbound telemetry.
    #[arg(long)]
    pub telemetry_url: Option<String>,
}

/// The spec's seven-level log vocabulary, mapped onto `tracing::Level`
/// in `logging::init` (`fatal` adds a `fatal=true` field over `error`;
/// `silent` installs a filter matching nothing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Silent,
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "fatal" => Ok(LogLevel::Fatal),
            "silent" => Ok(LogLevel::Silent),
            other => Err(format!("unrecognized log level '{other}'")),
        }
    }
}
