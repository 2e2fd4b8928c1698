//! cad-bridge-mcp: tool registry server for AI-assisted CAD automation
//!
//! Exposes each CAD capability as a typed MCP tool and forwards calls over
//! HTTP to the bridge embedded in the CAD host process.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use cad_bridge_mcp::config;
use cad_bridge_mcp::mcp::http;
use cad_bridge_mcp::mcp::server::{McpServer, ToolRegistry};
use cad_bridge_mcp::relay::RelayClient;

/// Tool registry server for AI-assisted CAD automation.
///
/// Exposes CAD operations (documents, geometry, viewport captures, library
/// parts, host scripts) as MCP tools, relayed to the bridge inside the CAD
/// host process.
#[derive(Parser, Debug)]
#[command(name = "cad-bridge-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Serve MCP over stdio instead of the HTTP listener
    #[arg(long)]
    stdio: bool,

    /// Override the configured registry port
    #[arg(long)]
    port: Option<u16>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Resolves the log level: `-q` beats `-v`, `-v` beats the configured level,
/// and an unrecognised configured level falls back to warn.
fn resolve_log_level(verbose: u8, quiet: bool, configured: &str) -> Level {
    if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => configured.parse().unwrap_or(Level::WARN),
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Logging goes to stderr: stdout may be carrying MCP messages.
fn init_tracing(level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Entry point for the cad-bridge-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nExpected config at: {}", default_path.display());
                    eprintln!("Create one based on config/example-config.json");
                }
            }
            return ExitCode::FAILURE;
        }
    };

    init_tracing(resolve_log_level(args.verbose, args.quiet, &cfg.logging.level));

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!(
        "cad-bridge-mcp {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!("Source: {}", env!("CARGO_PKG_REPOSITORY"));
    eprintln!();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting cad-bridge-mcp server"
    );

    let relay = match RelayClient::new(&cfg.bridge) {
        Ok(relay) => relay,
        Err(e) => {
            error!(error = %e, "Failed to build relay client");
            return ExitCode::FAILURE;
        }
    };
    info!(bridge = relay.base_url(), "Relay client ready");

    let registry = ToolRegistry::new(relay);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = if args.stdio {
        info!("MCP server ready, waiting for client connection on stdio...");
        let mut server = McpServer::new(registry);
        runtime.block_on(server.run())
    } else {
        let port = args.port.unwrap_or(cfg.registry.port);
        let addr = format!("{}:{port}", cfg.registry.host);
        info!(%addr, "Serving MCP over HTTP");
        runtime.block_on(async {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            http::serve(Arc::new(registry), listener).await
        })
    };

    match result {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
