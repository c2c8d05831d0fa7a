//! alphavantage-mcp: MCP server for Alpha Vantage market data
//!
//! Serves the Alpha Vantage tool catalog to MCP clients over stdio or
//! streamable HTTP.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use alphavantage_mcp::config::{self, ServerConfig, TransportMode};
use alphavantage_mcp::error::ServerError;
use alphavantage_mcp::gateway::AlphaVantageGateway;
use alphavantage_mcp::mcp::{shutdown_signal, Dispatcher, HttpTransport, McpServer};
use alphavantage_mcp::tools::ToolRegistry;

/// MCP server for Alpha Vantage market data.
///
/// Exposes stock quotes, time series, symbol search, company overviews,
/// exchange rates and market status as MCP tools.
#[derive(Parser, Debug)]
#[command(name = "alphavantage-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Transport to serve on
    #[arg(long = "server", value_enum, value_name = "TRANSPORT")]
    server: Option<TransportMode>,

    /// Port for the HTTP transport
    #[arg(long)]
    port: Option<u16>,

    /// Bind address for the HTTP transport
    #[arg(long)]
    host: Option<String>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr; stdout belongs to the stdio transport.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Applies CLI overrides on top of the file settings.
fn apply_overrides(server: &mut ServerConfig, args: &Args) {
    if let Some(transport) = args.server {
        server.transport = transport;
    }
    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(ref host) = args.host {
        server.host.clone_from(host);
    }
}

/// Resolves the HTTP bind address.
fn bind_address(server: &ServerConfig) -> io::Result<SocketAddr> {
    (server.host.as_str(), server.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("cannot resolve host '{}'", server.host),
            )
        })
}

/// Serves one client over stdin/stdout.
fn run_stdio(dispatcher: Arc<Dispatcher<AlphaVantageGateway>>) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    info!("MCP server ready, waiting for client connection...");

    runtime.block_on(async move {
        let mut server = McpServer::new(dispatcher);
        server.run().await
    })?;

    Ok(())
}

/// Serves many clients over streamable HTTP.
fn run_http(
    dispatcher: Arc<Dispatcher<AlphaVantageGateway>>,
    server: &ServerConfig,
) -> Result<(), ServerError> {
    let addr = bind_address(server)?;
    let transport = HttpTransport::new(dispatcher)
        .session_ttl(Duration::from_secs(server.session_ttl_secs))
        .max_sessions(server.max_sessions);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let shutdown = shutdown_signal()?;
        transport.serve(addr, shutdown).await
    })
}

/// Entry point for the alphavantage-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let mut cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    apply_overrides(&mut cfg.server, &args);
    if let Err(e) = cfg.validate() {
        eprintln!("Configuration error: {e}");
        return ExitCode::FAILURE;
    }

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = %cfg.server.transport,
        "Starting alphavantage-mcp server"
    );

    let gateway = match AlphaVantageGateway::from_config(&cfg.provider) {
        Ok(gateway) => gateway,
        Err(e) => {
            error!(error = %e, "Failed to set up the data provider gateway");
            return ExitCode::FAILURE;
        }
    };

    let registry = ToolRegistry::alphavantage();
    info!(tools = registry.len(), "Tool registry loaded");
    let dispatcher = Arc::new(Dispatcher::new(registry, gateway));

    let result = match cfg.server.transport {
        TransportMode::Stdio => run_stdio(dispatcher),
        TransportMode::Http => run_http(dispatcher, &cfg.server),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn cli_overrides_file_settings() {
        let args = Args::parse_from([
            "alphavantage-mcp",
            "--server",
            "http",
            "--port",
            "9000",
            "--host",
            "0.0.0.0",
        ]);
        let mut server = ServerConfig::default();
        apply_overrides(&mut server, &args);

        assert_eq!(server.transport, TransportMode::Http);
        assert_eq!(server.port, 9000);
        assert_eq!(server.host, "0.0.0.0");
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(get_log_level(0, true, "trace"), Level::ERROR);
        assert_eq!(get_log_level(0, false, "debug"), Level::DEBUG);
        assert_eq!(get_log_level(2, false, "error"), Level::DEBUG);
        assert_eq!(get_log_level(0, false, "bogus"), Level::WARN);
    }

    #[test]
    fn bind_address_resolves_literal_ip() {
        let server = ServerConfig::default();
        let addr = bind_address(&server).unwrap();
        assert_eq!(addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
    }
}
