//! Huddle Node - room relay server.
//!
//! This is the main entry point for running a Huddle node.

use anyhow::Context;
use clap::Parser;
use huddle_hub::Hub;
use huddle_node::api::{create_router, AppState};
use huddle_node::config::NodeConfig;
use huddle_node::observability::{init_logging, LogFormat};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::TcpListener, signal};

/// Huddle Node - WebSocket room relay
#[derive(Parser, Debug)]
#[command(name = "huddle-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    fn apply(&self, config: &mut NodeConfig) {
        if let Some(addr) = self.addr {
            config.server.addr = addr;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.logging.format = LogFormat::parse(format);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = NodeConfig::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut config);
    config.validate()?;

    init_logging(&config.logging.level, config.logging.format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Huddle node");
    tracing::info!(
        addr = %config.server.addr,
        outbound_capacity = config.hub.outbound_capacity,
        overflow = ?config.hub.overflow,
        retention = ?config.hub.retention,
        "Node configuration"
    );

    let hub = Arc::new(Hub::new(config.hub.clone()));

    if config.hub.retention.needs_sweep() {
        tokio::spawn(sweep_rooms(hub.clone(), config.sweep_interval()));
    }

    let app = create_router(AppState::new(hub.clone(), config.server.max_message_size));

    let listener = TcpListener::bind(config.server.addr)
        .await
        .with_context(|| format!("binding {}", config.server.addr))?;
    tracing::info!(addr = %config.server.addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub, config.grace_period()))
        .await
        .context("server error")?;

    tracing::info!("Huddle node stopped");
    Ok(())
}

/// Periodically remove idle rooms until the hub shuts down.
async fn sweep_rooms(hub: Arc<Hub>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    while !hub.is_shutting_down() {
        ticker.tick().await;
        hub.sweep();
    }
}

/// Wait for Ctrl+C or SIGTERM, then close every client session.
async fn shutdown_signal(hub: Arc<Hub>, grace: Duration) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Signal received, starting graceful shutdown");
    if !hub.shutdown(grace).await {
        tracing::warn!("Some sessions were still open when the grace period ended");
    }
}
