//! Chat relay server - Entry Point
//!
//! Binds the listener, then runs until SIGINT/SIGTERM and shuts down gracefully.

use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::config::DEFAULT_OUTBOX_CAPACITY;
use chat_relay::{ChatServer, ServerConfig};

/// Single-room TCP chat relay
#[derive(Parser, Debug)]
#[command(name = "chat_relay", version, about)]
struct Args {
    /// Host to listen on
    #[arg(long, env = "CHAT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(long, env = "CHAT_PORT", default_value_t = 8080)]
    port: u16,

    /// Seconds a new connection has to send JOIN
    #[arg(long, default_value_t = 5)]
    handshake_timeout_secs: u64,

    /// Pending lines per client before new ones are dropped
    #[arg(long, default_value_t = DEFAULT_OUTBOX_CAPACITY)]
    outbox_capacity: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let args = Args::parse();
    if args.outbox_capacity == 0 {
        return Err("--outbox-capacity must be at least 1".into());
    }

    let config = ServerConfig {
        handshake_timeout: Duration::from_secs(args.handshake_timeout_secs),
        outbox_capacity: args.outbox_capacity,
        ..ServerConfig::default()
    };

    let addr = format!("{}:{}", args.host, args.port);
    let server = ChatServer::listen_with_config(&addr, config).await?;

    wait_for_shutdown_signal().await?;
    server.shutdown().await;

    Ok(())
}

/// Wait for SIGTERM or SIGINT
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
