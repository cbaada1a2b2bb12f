//! Worker registry: liveness and per-worker statistics.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::info;

use crate::types::WorkerRecord;

struct RegistryState {
    workers: HashMap<u64, WorkerRecord>,
    /// Monotonic id allocator; ids are never reused within a coordinator
    /// lifetime.
    next_id: u64,
}

pub struct Registry {
    state: Mutex<RegistryState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                workers: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Register a new worker and allocate its id.
    pub fn register(&self, address: &str, port: u16) -> u64 {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state
            .workers
            .insert(id, WorkerRecord::new(id, address.to_string(), port));
        info!(worker_id = id, address, port, "registered worker");
        id
    }

    /// Refresh a worker's last-seen timestamp. Called for every observed
    /// message.
    pub fn touch(&self, id: u64) {
        if let Some(worker) = self.state.lock().workers.get_mut(&id) {
            worker.last_seen = Utc::now();
        }
    }

    /// Set the cumulative page count from a PROGRESS heartbeat.
    pub fn update_progress(&self, id: u64, pages_processed: u64) {
        if let Some(worker) = self.state.lock().workers.get_mut(&id) {
            worker.pages_processed = pages_processed;
            worker.last_seen = Utc::now();
        }
    }

    /// Count one processed page for a worker.
    pub fn increment_processed(&self, id: u64) {
        if let Some(worker) = self.state.lock().workers.get_mut(&id) {
            worker.pages_processed += 1;
            worker.last_seen = Utc::now();
        }
    }

    /// Record submitted links and, when the page yielded a record, a found
    /// book.
    pub fn add_stats(&self, id: u64, links_added: u64, found_book: bool) {
        if let Some(worker) = self.state.lock().workers.get_mut(&id) {
            worker.total_links += links_added;
            if found_book {
                worker.books_found += 1;
            }
            worker.last_seen = Utc::now();
        }
    }

    pub fn disconnect(&self, id: u64) {
        if self.state.lock().workers.remove(&id).is_some() {
            info!(worker_id = id, "worker disconnected");
        }
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().workers.len()
    }

    pub fn total_pages_processed(&self) -> u64 {
        self.state
            .lock()
            .workers
            .values()
            .map(|w| w.pages_processed)
            .sum()
    }

    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        let mut workers: Vec<WorkerRecord> = self.state.lock().workers.values().cloned().collect();
        workers.sort_by_key(|w| w.id);
        workers
    }
}
