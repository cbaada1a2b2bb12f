//! Worker: connects to the coordinator, pulls URLs, fetches and parses
//! pages, and reports results. Reconnects forever until the coordinator
//! orders a shutdown.

pub mod connection;
pub mod crawl;
pub mod dedup;
pub mod extractor;
pub mod fetcher;
pub mod heartbeat;

pub use connection::{Connection, ConnectionError};
pub use crawl::CrawlLoop;
pub use fetcher::{FetchConfig, FetchError, PageFetcher};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::WorkerConfig;

/// State shared between the crawl loop and the heartbeat task.
///
/// `stop` ends the current connection (reconnect follows); `shutdown` ends
/// the worker process. The page counter is cumulative across reconnects.
pub struct SharedState {
    processed_pages: AtomicU64,
    stop: AtomicBool,
    shutdown: AtomicBool,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            processed_pages: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn pages(&self) -> u64 {
        self.processed_pages.load(Ordering::SeqCst)
    }

    pub fn add_pages(&self, count: u64) {
        self.processed_pages.fetch_add(count, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// A coordinator-ordered shutdown also stops the current connection.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn reset_stop(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }
}

/// Run the worker until the coordinator orders a shutdown.
pub async fn run(config: WorkerConfig) -> Result<()> {
    let state = Arc::new(SharedState::new());
    let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);
    let fetch_config = FetchConfig {
        user_agent: config.user_agent.clone(),
        timeout: Duration::from_secs(config.fetch_timeout_secs),
        ..FetchConfig::default()
    };

    loop {
        state.reset_stop();

        info!(
            server = %config.server,
            port = config.port,
            "connecting to coordinator"
        );
        let connection = match Connection::open(&config.server, config.port).await {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                warn!(error = %e, "failed to connect, retrying in {}s", reconnect_delay.as_secs());
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
        };

        let worker_id = match connection.register().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "registration failed, retrying in {}s", reconnect_delay.as_secs());
                tokio::time::sleep(reconnect_delay).await;
                continue;
            }
        };
        info!(worker_id, hostname = %config.hostname, "registered with coordinator");

        let heartbeat_handle = tokio::spawn(heartbeat::run(
            connection.clone(),
            state.clone(),
            Duration::from_secs(config.heartbeat_interval_secs),
            Duration::from_secs(config.ack_timeout_secs),
        ));

        let fetcher = PageFetcher::new(&fetch_config)?;
        let mut crawl = CrawlLoop::new(connection, fetcher, state.clone(), &config);
        crawl.run().await;

        state.request_stop();
        let _ = heartbeat_handle.await;

        if state.shutting_down() {
            info!(
                pages = state.pages(),
                "coordinator requested shutdown, worker exiting"
            );
            return Ok(());
        }

        info!(
            "connection to coordinator lost, reconnecting in {}s",
            reconnect_delay.as_secs()
        );
        tokio::time::sleep(reconnect_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_implies_stop() {
        let state = SharedState::new();
        assert!(!state.stopped());
        state.request_shutdown();
        assert!(state.stopped());
        assert!(state.shutting_down());

        // A reconnect clears the per-connection flag but not the shutdown.
        state.reset_stop();
        assert!(!state.stopped());
        assert!(state.shutting_down());
    }

    #[test]
    fn page_counter_is_cumulative() {
        let state = SharedState::new();
        state.add_pages(3);
        state.add_pages(2);
        assert_eq!(state.pages(), 5);
    }
}
