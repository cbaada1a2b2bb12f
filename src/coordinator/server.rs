//! TCP protocol server and the periodic status reporter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use super::control::ControlPlane;
use super::session::run_session;

/// Worker-facing TCP server.
pub struct CrawlServer {
    listener: TcpListener,
    control: Arc<ControlPlane>,
}

impl CrawlServer {
    /// Bind the protocol listener.
    pub async fn bind(addr: &str, control: Arc<ControlPlane>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind protocol listener on {addr}"))?;
        Ok(Self { listener, control })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("protocol listener has no local address")
    }

    /// Accept worker connections until shutdown, one session task per
    /// connection.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(addr = %self.local_addr()?, "protocol server listening");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let control = self.control.clone();
                            tokio::spawn(async move {
                                run_session(stream, peer, control).await;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "accept error");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("protocol server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Log a status block every five seconds: totals plus a per-worker line with
/// uptime, crawl rate, and last-seen time.
pub async fn status_reporter(control: Arc<ControlPlane>, mut shutdown: broadcast::Receiver<()>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let frontier = control.frontier();
                let registry = control.registry();
                info!(
                    workers = registry.active_count(),
                    total_pages = registry.total_pages_processed(),
                    pending_urls = frontier.queue_size(),
                    processed_urls = frontier.processed_count(),
                    books = frontier.book_count(),
                    items = frontier.item_count(),
                    "coordinator status"
                );

                for worker in registry.snapshot() {
                    let uptime_min = (chrono::Utc::now() - worker.start_time).num_minutes();
                    let rate = if uptime_min > 0 {
                        worker.pages_processed as f64 / uptime_min as f64
                    } else {
                        0.0
                    };
                    info!(
                        worker_id = worker.id,
                        address = %format!("{}:{}", worker.address, worker.port),
                        pages = worker.pages_processed,
                        books = worker.books_found,
                        links = worker.total_links,
                        uptime_min,
                        pages_per_min = %format!("{rate:.1}"),
                        last_seen = %worker.last_seen.format("%H:%M:%S"),
                        "worker status"
                    );
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    warn!("status reporter stopped");
}
