//! Control plane: the crawl gate, the shutdown flag, and the status surface.
//!
//! One instance is shared by the protocol sessions, the HTTP API, and the
//! signal handler. Everything it guards is either an atomic flag or delegated
//! to the frontier/registry mutexes, so no two locks are ever held at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::info;

use super::frontier::Frontier;
use super::registry::Registry;
use crate::types::StatusSnapshot;

pub struct ControlPlane {
    /// The gate: GET_URL only hands out work while this is set.
    crawler_enabled: AtomicBool,
    /// Cooperative shutdown flag, polled by every loop.
    shutting_down: AtomicBool,
    frontier: Arc<Frontier>,
    registry: Arc<Registry>,
}

impl ControlPlane {
    pub fn new(frontier: Arc<Frontier>, registry: Arc<Registry>) -> Self {
        Self {
            crawler_enabled: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            frontier,
            registry,
        }
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Open the gate and queue the seed URL.
    pub fn start(&self) {
        self.crawler_enabled.store(true, Ordering::SeqCst);
        self.frontier.add_seed_to_queue();
        info!("crawler started");
    }

    /// Change the seed URL, which resets the whole crawl.
    pub fn set_seed(&self, url: &str) -> Result<()> {
        let url = url.trim();
        if url.is_empty() {
            bail!("no URL provided");
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("seed URL must be absolute (http:// or https://): {url}");
        }
        self.frontier.set_seed(url);
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.crawler_enabled.load(Ordering::SeqCst)
    }

    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.is_enabled(),
            queue_size: self.frontier.queue_size(),
            processed_urls: self.frontier.processed_count(),
            books_found: self.frontier.book_count(),
            items_found: self.frontier.item_count(),
            workers: self.registry.active_count(),
            seed_url: self.frontier.seed_url(),
            item_type: self.frontier.item_type().label().to_string(),
            server_status: if self.is_shutting_down() {
                "shutting_down".to_string()
            } else {
                "running".to_string()
            },
        }
    }
}
