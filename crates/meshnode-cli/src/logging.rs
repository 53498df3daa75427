//! # Structured Logging Setup
//!
//! Installs the global `tracing` subscriber and opens the root span
//! that carries `nodeId` for the life of the process (§10). `fatal`
//! logs at `error` with a `fatal=true` field since `tracing::Level` has
//! no sixth level of its own; `silent` installs a filter that matches
//! nothing rather than skipping initialization, so a later
//! `EnvFilter::try_from_default_env` override still has a subscriber to
//! attach to.

use meshnode_core::NodeId;
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Holds the process's root span open. Drop this only at shutdown.
pub struct LoggingGuard {
    _span: tracing::span::EnteredSpan,
}

pub fn init(level: LogLevel, node_id: &NodeId) -> LoggingGuard {
    let filter = match level {
        LogLevel::Trace => EnvFilter::new("trace"),
        LogLevel::Debug => EnvFilter::new("debug"),
        LogLevel::Info => EnvFilter::new("info"),
        LogLevel::Warn => EnvFilter::new("warn"),
        LogLevel::Error | LogLevel::Fatal => EnvFilter::new("error"),
        LogLevel::Silent => EnvFilter::new("off"),
    };

    tracing_subscriber::fmt().json().with_env_filter(filter).with_target(true).init();

    let span = tracing::info_span!("connector", node_id = %node_id, fatal = level == LogLevel::Fatal);
    LoggingGuard { _span: span.entered() }
}
