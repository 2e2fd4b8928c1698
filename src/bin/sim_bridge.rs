//! cad-bridge-sim: bridge server backed by the simulated host
//!
//! Runs the same HTTP bridge a real deployment embeds in the CAD process,
//! but against the in-memory simulated host. Lets the full registry → relay
//! → bridge stack be driven end-to-end without a CAD application.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use cad_bridge_mcp::bridge::protocol::{BRIDGE_HOST, BRIDGE_PORT};
use cad_bridge_mcp::bridge::BridgeServer;
use cad_bridge_mcp::host::SimulatedHost;

/// Bridge server backed by the simulated CAD host.
#[derive(Parser, Debug)]
#[command(name = "cad-bridge-sim")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory viewport captures are written to (default: system temp dir)
    #[arg(long, value_name = "DIR")]
    capture_dir: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

fn log_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(signal) => signal,
        Err(_) => return std::future::pending().await,
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(_) => return std::future::pending().await,
    };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, shutting down");
    } else {
        std::future::pending::<()>().await;
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::from_default_env().add_directive(log_level(args.verbose, args.quiet).into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut host = SimulatedHost::new();
    if let Some(dir) = args.capture_dir {
        host = host.with_capture_dir(dir);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        // The bridge port is fixed: the relay side hardcodes it too.
        let addr = format!("{BRIDGE_HOST}:{BRIDGE_PORT}");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "Bridge server listening");
        BridgeServer::new(host)
            .serve_with_shutdown(listener, shutdown_signal())
            .await
    });

    match result {
        Ok(()) => {
            info!("Bridge shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Bridge server error");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn quiet_wins() {
        assert_eq!(log_level(3, true), Level::ERROR);
        assert_eq!(log_level(0, false), Level::INFO);
    }
}
