//! # meshnode connector entry point
//!
//! Parses command-line arguments, resolves the topology configuration,
//! installs structured logging, and runs the connector until shutdown
//! (§6: exit 0 on clean shutdown, 1 on configuration error, 2 on an
//! unrecoverable runtime error).

use std::process::ExitCode;

use clap::Parser;

use meshnode_cli::cli::Cli;
use meshnode_cli::{config, connector, logging};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let resolved = match config::resolve(cli) {
        Ok(resolved) => resolved,
        Err(err) => {
            eprintln!("configuration error: {err:#}");
            return ExitCode::from(1);
        }
    };

    let _guard = logging::init(resolved.log_level, &resolved.node_id);
    tracing::info!(node_id = %resolved.node_id, btp_port = resolved.btp_port, health_port = resolved.health_port, "meshnode starting");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start async runtime: {err:#}");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(connector::run(resolved)) {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(2)
        }
    }
}
