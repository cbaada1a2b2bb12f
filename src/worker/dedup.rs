//! Worker-local deduplication.
//!
//! Two layers in front of the coordinator's authoritative sets: a canonical
//! URL cache so the same page is never fetched twice from this worker, and a
//! sliding window of recent records to collapse near-duplicate pages that
//! present the same item under different URLs.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::canonical;
use crate::types::BookRecord;

/// Canonical URLs this worker has already handled. Capped: on overflow the
/// set is cleared back down to just the seed URL, accepting some re-crawls
/// over unbounded growth.
pub struct SeenUrls {
    seen: HashSet<String>,
    seed: String,
    capacity: usize,
}

pub const SEEN_URLS_CAPACITY: usize = 10_000;

impl SeenUrls {
    pub fn new(seed_url: &str) -> Self {
        Self {
            seen: HashSet::new(),
            seed: canonical::canonicalize(seed_url),
            capacity: SEEN_URLS_CAPACITY,
        }
    }

    /// Record a URL, returning true when it was already seen.
    pub fn check_and_insert(&mut self, url: &str) -> bool {
        let key = canonical::canonicalize(url);
        if self.seen.contains(&key) {
            return true;
        }

        if self.seen.len() >= self.capacity {
            debug!(capacity = self.capacity, "clearing processed URL cache");
            self.seen.clear();
            let seed = self.seed.clone();
            self.seen.insert(seed);
        }
        self.seen.insert(key);
        false
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Sliding window of the most recent records. A new record is suppressed
/// when it matches an existing one on (title, price, rating) or when one
/// title is a case-insensitive substring of the other.
pub struct RecentRecords {
    window: VecDeque<BookRecord>,
    capacity: usize,
}

pub const RECENT_RECORDS_CAPACITY: usize = 50;

impl Default for RecentRecords {
    fn default() -> Self {
        Self::new(RECENT_RECORDS_CAPACITY)
    }
}

impl RecentRecords {
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Check a record against the window; non-duplicates are added.
    pub fn check_and_insert(&mut self, record: &BookRecord) -> bool {
        if record.is_empty() {
            return false;
        }

        for recent in &self.window {
            if recent.title == record.title
                && recent.price == record.price
                && recent.rating == record.rating
            {
                debug!(title = %record.title, "suppressing duplicate record");
                return true;
            }
            if titles_overlap(&recent.title, &record.title) {
                debug!(
                    title = %record.title,
                    similar_to = %recent.title,
                    "suppressing near-duplicate record"
                );
                return true;
            }
        }

        if self.window.len() >= self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(record.clone());
        false
    }
}

/// Case-insensitive containment in either direction.
fn titles_overlap(a: &str, b: &str) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let (shorter, longer) = if a.len() < b.len() { (a, b) } else { (b, a) };
    longer.contains(&shorter)
}
