//! chatstream-server binary
//!
//! Serves the chatstream session protocol over WebSockets, backed by the
//! built-in echo source. Swap in a real `TokenSource` implementation to put
//! an actual model behind the same protocol.

use anyhow::Result;
use chatstream_server::{shutdown_signal, ChatServer, EchoSource, ServerConfig};
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Command line arguments for the chatstream server.
#[derive(Parser, Debug)]
#[command(name = "chatstream-server")]
#[command(about = "A WebSocket server streaming chat replies over the chatstream protocol")]
#[command(version)]
struct Args {
    /// Server bind address
    #[arg(short, long, default_value = "127.0.0.1:8000")]
    bind: String,

    /// Enable CORS
    #[arg(long, default_value = "true")]
    cors: bool,

    /// CORS allowed origins (comma-separated)
    #[arg(long)]
    cors_origins: Option<String>,

    /// Seconds to wait for the next reply fragment before failing the turn
    #[arg(long, default_value = "30")]
    stream_timeout: u64,

    /// Status text sent to every client on connect
    #[arg(long, default_value = "Connected to AI. Ask me anything!")]
    greeting: String,

    /// Enable request logging
    #[arg(long, default_value = "true")]
    logging: bool,

    /// Milliseconds between fragments of the echo source
    #[arg(long, default_value = "50")]
    echo_delay: u64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    // Parse bind address
    let bind_addr: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", args.bind, e))?;

    // Parse CORS origins
    let cors_origins = args
        .cors_origins
        .map(|origins| origins.split(',').map(|s| s.trim().to_string()).collect());

    let config = ServerConfig::new()
        .with_bind_addr(bind_addr)
        .with_cors(args.cors)
        .with_cors_origins(cors_origins.unwrap_or_default())
        .with_logging(args.logging)
        .with_stream_timeout(Duration::from_secs(args.stream_timeout))
        .with_greeting(args.greeting);

    let source = EchoSource::new(Duration::from_millis(args.echo_delay));
    let server = ChatServer::with_config(source, config);

    log::info!("Starting chatstream server...");
    log::info!("Configuration:");
    log::info!("  Bind address: {}", bind_addr);
    log::info!("  CORS enabled: {}", args.cors);
    log::info!("  Stream timeout: {}s", args.stream_timeout);
    log::info!("  Logging enabled: {}", args.logging);

    server.serve_with_shutdown(shutdown_signal()).await?;

    Ok(())
}
