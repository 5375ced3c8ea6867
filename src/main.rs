//! DCache - A distributed TTL key-value cache node
//!
//! Runs one cache node as a leader, or as a follower when `LEADER_ADDR` is set.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dcache::admin::{create_router, AdminState};
use dcache::{spawn_sweep_task, Cache, Config, Server};

/// Main entry point for a cache node.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the storage engine and cache
/// 4. Start the background expiry sweep
/// 5. Bind the peer listener and, if configured, the admin HTTP server
/// 6. Serve until SIGINT/SIGTERM, or until a follower loses its leader
#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dcache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting DCache node");

    let config = Config::from_env();
    let role = config.role();
    info!(
        "Configuration loaded: listen={}, role={}, cleanup_interval={}s, size_classes={:?}",
        config.listen_addr,
        role.name(),
        config.cleanup_interval,
        config.size_classes
    );

    let storage = config.storage().context("invalid SIZE_CLASSES layout")?;
    let cache = Arc::new(Cache::new(storage));
    info!("Cache initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep_handle = spawn_sweep_task(cache.clone(), config.cleanup_interval(), shutdown_rx.clone());

    let server = Server::bind(config.server_options(), cache.clone()).await?;
    info!("Node listening on {}", server.local_addr()?);

    let admin_handle = match &config.admin_addr {
        Some(addr) => {
            let state = AdminState::new(cache.clone(), server.followers(), role.name());
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind admin address {addr}"))?;
            info!("Admin API listening on http://{}", listener.local_addr()?);

            let mut admin_shutdown = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                let result = axum::serve(listener, create_router(state))
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.changed().await;
                    })
                    .await;
                if let Err(err) = result {
                    error!(error = %err, "Admin server failed");
                }
            }))
        }
        None => None,
    };

    let mut server_shutdown = shutdown_rx;
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let result = server
        .run_until(async move {
            let _ = server_shutdown.changed().await;
        })
        .await;

    // A follower that lost its leader stops the remaining tasks itself
    signal_task.abort();
    let _ = sweep_handle.await;
    if let Some(handle) = admin_handle {
        let _ = handle.await;
    }

    match &result {
        Ok(()) => info!("Node shutdown complete"),
        Err(err) => error!(error = ?err, "Node stopped"),
    }
    result
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
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
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
