//! Queue Bridge - REST front end for RabbitMQ queues.
//!
//! This binary:
//! 1. Connects to the broker (and exits if it cannot)
//! 2. Serves `POST /api/{queue}` and `GET /api/{queue}?timeout={ms}`
//! 3. Closes the broker connection after a graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use queue_bridge::{
    router, AppState, Broker, BrokerKind, Config, ConnectionManager, InMemoryBroker,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("bridge_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        broker = ?config.broker,
        poll_interval_ms = config.poll_interval_ms,
        default_poll_timeout_ms = config.default_poll_timeout_ms,
        "config_loaded"
    );

    // Connect before accepting traffic
    let connection = ConnectionManager::new();
    match config.broker {
        BrokerKind::Amqp => connection
            .connect(&config.amqp_url)
            .await
            .context("Failed to connect to RabbitMQ")?,
        BrokerKind::Memory => connection
            .establish(async { Ok(Arc::new(InMemoryBroker::new()) as Arc<dyn Broker>) })
            .await
            .context("Failed to start in-memory broker")?,
    }

    let state = AppState::new(config.clone(), connection.clone());
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "bridge_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Close broker connection
    connection.close().await;

    info!("bridge_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("bridge_shutting_down");
}
