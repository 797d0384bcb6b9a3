//! A2A HTTP Bridge: serves an A2A agent over JSON-RPC, REST and SSE.
//!
//! Usage:
//!   a2a-http-bridge                              # Default port 7070
//!   a2a-http-bridge --port 8080                  # Custom port
//!   a2a-http-bridge --agent-name "My Echo"       # Name advertised in the card
//!   a2a-http-bridge --log-file /tmp/a2a.log      # Log to a file instead of stderr

use std::path::PathBuf;
use std::sync::Arc;

use a2a_http_bridge::echo::{self, EchoAgent};
use a2a_server::{BridgeInitializer, BridgedCallContextBuilder, BridgedRequestHandler, DependencyBridge};
use a2a_transport::{TransportConfig, TransportServer};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "a2a-http-bridge", about = "A2A HTTP Bridge: JSON-RPC, REST and SSE")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "7070")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Name advertised in the agent card
    #[arg(long, default_value = "Echo Agent")]
    agent_name: String,

    /// Enable permissive CORS
    #[arg(long)]
    cors: bool,

    /// Maximum concurrent SSE streams
    #[arg(long, default_value = "64")]
    max_streams: usize,

    /// Encoded frames buffered per stream ahead of the connection
    #[arg(long, default_value = "1")]
    stream_buffer: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(cli: &Cli) {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let Some(log_path) = &cli.log_file else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return;
    };

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(file) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
            eprintln!("Logging to {}", log_path.display());
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            error!("Failed to open log file {}: {e}", log_path.display());
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let url = format!("http://{}:{}/", cli.hostname, cli.port);
    let card = echo::agent_card(&cli.agent_name, &url);
    let agent = Arc::new(EchoAgent::new(card.clone()));

    // Publish the managed dependencies before the transport accepts requests.
    let registration = match BridgeInitializer::new(card, agent).on_startup(DependencyBridge::global()) {
        Ok(registration) => registration,
        Err(e) => {
            error!("Failed to initialize dependency bridge: {e}");
            std::process::exit(1);
        }
    };

    let handler = BridgedRequestHandler::default();
    let executor = match handler.executor() {
        Ok(executor) => executor,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let transport_config = TransportConfig {
        port: cli.port,
        hostname: cli.hostname.clone(),
        enable_cors: cli.cors,
        max_streams: Some(cli.max_streams),
        stream_buffer: cli.stream_buffer,
    };

    let mut transport = match TransportServer::start(
        transport_config,
        Arc::new(handler),
        Arc::new(BridgedCallContextBuilder::default()),
        executor,
    )
    .await
    {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to start transport: {e}");
            std::process::exit(1);
        }
    };

    let base = format!("http://{}:{}", cli.hostname, transport.port());

    println!();
    println!("  A2A HTTP Bridge");
    println!("────────────────────────────────────────────────────────────────");
    println!("  Agent:      {}", cli.agent_name);
    println!("  JSON-RPC:   POST {base}/");
    println!("  REST:       {base}/v1");
    println!("  Card:       {base}/.well-known/agent-card.json");
    println!("────────────────────────────────────────────────────────────────");
    println!("  Press Ctrl+C to stop.");
    println!();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }

    info!("Shutting down");
    transport.stop().await;
    registration.shutdown();
    println!("  Server stopped.");
}
