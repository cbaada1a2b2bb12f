//! Coordinator: the authoritative side of the crawl.
//!
//! Owns the URL frontier and the worker registry, speaks the worker protocol
//! on one port and the HTTP control API on another, and persists collected
//! records to CSV on shutdown.

pub mod control;
pub mod export;
pub mod frontier;
pub mod http;
pub mod registry;
pub mod server;
pub mod session;

pub use control::ControlPlane;
pub use frontier::Frontier;
pub use registry::Registry;
pub use server::CrawlServer;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::CoordinatorConfig;

/// Run the coordinator until a shutdown signal arrives, then persist the
/// collected records. A second Ctrl+C during shutdown exits immediately
/// without persistence.
pub async fn run(config: CoordinatorConfig) -> Result<()> {
    let frontier = Arc::new(Frontier::new(&config.seed_url));
    let registry = Arc::new(Registry::new());
    let control = Arc::new(ControlPlane::new(frontier.clone(), registry));

    let (shutdown_tx, _) = broadcast::channel(16);

    // Protocol server for workers.
    let crawl_server = CrawlServer::bind(&config.listen_addr, control.clone()).await?;
    let server_handle = {
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = crawl_server.run(shutdown_rx).await {
                error!(error = %e, "protocol server failed");
            }
        })
    };

    // HTTP control API.
    let http_listener = tokio::net::TcpListener::bind(&config.http_listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {}", config.http_listen_addr))?;
    let http_handle = {
        let state = http::AppState {
            control: control.clone(),
            frontend_path: config.frontend_path.clone(),
        };
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = http::serve(http_listener, state, shutdown_rx).await {
                error!(error = %e, "HTTP API failed");
            }
        })
    };

    // Periodic status log.
    tokio::spawn(server::status_reporter(
        control.clone(),
        shutdown_tx.subscribe(),
    ));

    info!("coordinator running, press Ctrl+C to shut down");

    tokio::select! {
        _ = signal::ctrl_c() => info!("received Ctrl+C, shutting down"),
        _ = wait_for_sigterm() => info!("received SIGTERM, shutting down"),
    }

    control.begin_shutdown();
    let _ = shutdown_tx.send(());

    // Run the graceful teardown, but let a second Ctrl+C cut it short.
    tokio::select! {
        result = finish(&config, &frontier, server_handle, http_handle) => result,
        _ = signal::ctrl_c() => {
            warn!("second Ctrl+C, skipping persistence");
            std::process::exit(0);
        }
    }
}

/// Wait for the servers to stop, then persist collected records.
async fn finish(
    config: &CoordinatorConfig,
    frontier: &Frontier,
    server_handle: tokio::task::JoinHandle<()>,
    http_handle: tokio::task::JoinHandle<()>,
) -> Result<()> {
    for (name, handle) in [("protocol server", server_handle), ("HTTP API", http_handle)] {
        let abort = handle.abort_handle();
        if tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .is_err()
        {
            warn!("{name} did not shut down within 5s, aborting");
            abort.abort();
        }
    }

    info!("saving collected data");
    export::write_books_csv(&config.books_csv, &frontier.books_snapshot())
        .with_context(|| format!("failed to write {}", config.books_csv.display()))?;
    export::write_items_csv(&config.items_csv, &frontier.items_snapshot())
        .with_context(|| format!("failed to write {}", config.items_csv.display()))?;

    info!("coordinator shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!(error = %e, "failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
