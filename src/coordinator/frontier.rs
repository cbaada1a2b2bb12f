//! URL frontier: the authoritative owner of the crawl state.
//!
//! A canonical URL lives in at most one of {queued, assigned, processed} at
//! any moment. Transitions are queued -> assigned -> processed, plus
//! assigned -> queued when a worker disconnects mid-work.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::canonical;
use crate::types::{BookRecord, Item, ItemType};

pub const DEFAULT_SEED_URL: &str = "https://books.toscrape.com/";

/// In-flight assignment: the worker holding the URL plus the original form
/// to re-queue on reassignment.
struct Assignment {
    worker_id: u64,
    original_url: String,
}

struct FrontierState {
    /// FIFO of original-form URLs awaiting assignment.
    queue: VecDeque<String>,
    /// Canonical forms currently in `queue`.
    queued: HashSet<String>,
    /// Canonical form -> current assignment.
    assigned: HashMap<String, Assignment>,
    /// Canonical forms whose processing has been acknowledged.
    processed: HashSet<String>,
    /// Crawl hostname in comparison form (lowercase, `www.`-less).
    hostname: String,
    seed_url: String,
    item_type: ItemType,
    books: Vec<BookRecord>,
    items: Vec<Item>,
}

/// The frontier, serialized under a single mutex.
pub struct Frontier {
    state: Mutex<FrontierState>,
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new(DEFAULT_SEED_URL)
    }
}

impl Frontier {
    pub fn new(seed_url: &str) -> Self {
        let hostname = canonical::canonical_host(seed_url);
        let item_type = ItemType::infer(&hostname);
        Self {
            state: Mutex::new(FrontierState {
                queue: VecDeque::new(),
                queued: HashSet::new(),
                assigned: HashMap::new(),
                processed: HashSet::new(),
                hostname,
                seed_url: seed_url.to_string(),
                item_type,
                books: Vec::new(),
                items: Vec::new(),
            }),
        }
    }

    /// Change the seed URL. Re-derives the crawl hostname and item type, then
    /// clears every frontier set and the collected records: setting the seed
    /// is the "start a new crawl" operation.
    pub fn set_seed(&self, url: &str) {
        let mut state = self.state.lock();
        state.seed_url = url.to_string();
        state.hostname = canonical::canonical_host(url);
        state.item_type = ItemType::infer(&state.hostname);

        state.queue.clear();
        state.queued.clear();
        state.assigned.clear();
        state.processed.clear();
        state.books.clear();
        state.items.clear();

        info!(
            seed = url,
            item_type = state.item_type.label(),
            "seed URL set, frontier reset"
        );
    }

    /// Push the seed into the queue, removing it from `processed` first so a
    /// restarted crawl re-crawls the seed.
    pub fn add_seed_to_queue(&self) {
        let mut state = self.state.lock();
        let seed = state.seed_url.clone();
        let key = canonical::canonicalize(&seed);

        if state.processed.remove(&key) {
            debug!(url = %seed, "removed seed from processed set for re-crawl");
        }
        if state.queued.remove(&key) {
            // Already queued; drop the stale queue entry before re-adding.
            state.queue.retain(|u| canonical::canonicalize(u) != key);
        }
        state.assigned.remove(&key);

        state.queue.push_back(seed.clone());
        state.queued.insert(key);
        info!(url = %seed, "seed URL queued");
    }

    /// Add a batch of discovered URLs, reporting (added, skipped).
    pub fn add_urls(&self, urls: &[String]) -> (usize, usize) {
        let mut state = self.state.lock();
        let mut added = 0;
        let mut skipped = 0;

        for url in urls {
            if state.try_add(url) {
                added += 1;
            } else {
                skipped += 1;
            }
        }

        if added > 0 || skipped > 0 {
            debug!(added, skipped, "batch URL add");
        }
        (added, skipped)
    }

    /// Add a single discovered URL. Returns false when dropped as a
    /// duplicate or host mismatch.
    pub fn add_url(&self, url: &str) -> bool {
        self.state.lock().try_add(url)
    }

    /// Pop the next URL and record its assignment to `worker_id`.
    pub fn next_url(&self, worker_id: u64) -> Option<String> {
        let mut state = self.state.lock();
        let url = state.queue.pop_front()?;
        let key = canonical::canonicalize(&url);
        state.queued.remove(&key);
        state.assigned.insert(
            key,
            Assignment {
                worker_id,
                original_url: url.clone(),
            },
        );
        debug!(worker_id, url = %url, "assigned URL");
        Some(url)
    }

    /// Acknowledge that a URL finished processing. Double-marking logs a
    /// warning but succeeds.
    pub fn mark_processed(&self, url: &str) {
        let mut state = self.state.lock();
        let key = canonical::canonicalize(url);

        if state.processed.contains(&key) {
            warn!(url, "URL was already marked as processed");
            return;
        }

        if state.queued.remove(&key) {
            state.queue.retain(|u| canonical::canonicalize(u) != key);
        }
        match state.assigned.remove(&key) {
            Some(assignment) => {
                debug!(worker_id = assignment.worker_id, url, "URL processed")
            }
            None => debug!(url, "URL processed but was not assigned to any worker"),
        }
        state.processed.insert(key);
    }

    /// Return every URL assigned to `worker_id` to the queue. Invoked when a
    /// worker's connection closes; the TCP close is the only signal that the
    /// worker abandoned its in-flight work.
    pub fn reassign_from(&self, worker_id: u64) -> usize {
        let mut state = self.state.lock();
        let keys: Vec<String> = state
            .assigned
            .iter()
            .filter(|(_, a)| a.worker_id == worker_id)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &keys {
            if let Some(assignment) = state.assigned.remove(key) {
                state.queue.push_back(assignment.original_url);
                state.queued.insert(key.clone());
            }
        }

        if !keys.is_empty() {
            info!(
                worker_id,
                count = keys.len(),
                "reassigned URLs from disconnected worker"
            );
        }
        keys.len()
    }

    /// Store a book record, deduplicated on (title, price, rating) rather
    /// than URL so mirror pages collapse. Also appends the generic item form.
    pub fn add_book(&self, book: BookRecord) {
        let mut state = self.state.lock();
        let duplicate = state
            .books
            .iter()
            .any(|b| b.title == book.title && b.price == book.price && b.rating == book.rating);

        if duplicate {
            debug!(title = %book.title, "skipped duplicate book");
            return;
        }

        info!(title = %book.title, "added book");
        state.items.push(Item::from_book(&book));
        state.books.push(book);
    }

    /// Store a generic item, deduplicated on (type, title, price, rating).
    /// Book items are mirrored into the book collection.
    pub fn add_item(&self, item: Item) {
        let mut state = self.state.lock();
        if state.items.iter().any(|i| i.same_key(&item)) {
            debug!(title = %item.title, kind = item.item_type.label(), "skipped duplicate item");
            return;
        }

        if item.item_type == ItemType::Book {
            state.books.push(BookRecord {
                title: item.title.clone(),
                price: item
                    .fields
                    .get("price_original")
                    .cloned()
                    .unwrap_or_else(|| item.price.to_string()),
                rating: item
                    .fields
                    .get("rating_original")
                    .cloned()
                    .unwrap_or_else(|| item.rating.to_string()),
                url: item.url.clone(),
            });
        }

        info!(title = %item.title, kind = item.item_type.label(), "added item");
        state.items.push(item);
    }

    pub fn queue_size(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn processed_count(&self) -> usize {
        self.state.lock().processed.len()
    }

    pub fn book_count(&self) -> usize {
        self.state.lock().books.len()
    }

    pub fn item_count(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn seed_url(&self) -> String {
        self.state.lock().seed_url.clone()
    }

    pub fn hostname(&self) -> String {
        self.state.lock().hostname.clone()
    }

    pub fn item_type(&self) -> ItemType {
        self.state.lock().item_type
    }

    pub fn books_snapshot(&self) -> Vec<BookRecord> {
        self.state.lock().books.clone()
    }

    pub fn items_snapshot(&self) -> Vec<Item> {
        self.state.lock().items.clone()
    }

    pub fn is_processed(&self, url: &str) -> bool {
        self.state
            .lock()
            .processed
            .contains(&canonical::canonicalize(url))
    }

    pub fn is_queued(&self, url: &str) -> bool {
        self.state
            .lock()
            .queued
            .contains(&canonical::canonicalize(url))
    }

    pub fn assigned_count(&self, worker_id: u64) -> usize {
        self.state
            .lock()
            .assigned
            .values()
            .filter(|a| a.worker_id == worker_id)
            .count()
    }
}

impl FrontierState {
    fn try_add(&mut self, url: &str) -> bool {
        let key = canonical::canonicalize(url);
        if key.is_empty() {
            return false;
        }
        if self.queued.contains(&key)
            || self.processed.contains(&key)
            || self.assigned.contains_key(&key)
        {
            return false;
        }
        if canonical::canonical_host(url) != self.hostname {
            return false;
        }

        self.queue.push_back(url.to_string());
        self.queued.insert(key);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Frontier {
        let frontier = Frontier::new("http://books.toscrape.com/");
        frontier.add_seed_to_queue();
        frontier
    }

    #[test]
    fn seed_lifecycle() {
        let frontier = seeded();
        assert_eq!(frontier.queue_size(), 1);
        assert_eq!(frontier.item_type(), ItemType::Book);
        assert_eq!(frontier.hostname(), "books.toscrape.com");
    }

    #[test]
    fn add_seed_is_idempotent() {
        let frontier = seeded();
        frontier.add_seed_to_queue();
        assert_eq!(frontier.queue_size(), 1);
    }

    #[test]
    fn seed_recrawl_after_processing() {
        let frontier = seeded();
        let url = frontier.next_url(1).unwrap();
        frontier.mark_processed(&url);
        assert_eq!(frontier.processed_count(), 1);

        // A restart must be able to re-crawl the seed.
        frontier.add_seed_to_queue();
        assert_eq!(frontier.processed_count(), 0);
        assert_eq!(frontier.queue_size(), 1);
    }

    #[test]
    fn duplicate_urls_are_dropped() {
        let frontier = seeded();
        assert!(frontier.add_url("http://books.toscrape.com/x"));
        assert!(!frontier.add_url("http://books.toscrape.com/x/"));
        assert!(!frontier.add_url("HTTP://WWW.books.toscrape.com/x"));
        assert_eq!(frontier.queue_size(), 2);
    }

    #[test]
    fn host_mismatch_leaves_frontier_unchanged() {
        let frontier = seeded();
        let before = frontier.queue_size();
        assert!(!frontier.add_url("http://example.com/x"));
        assert_eq!(frontier.queue_size(), before);
    }

    #[test]
    fn membership_is_exclusive() {
        let frontier = seeded();
        frontier.add_url("http://books.toscrape.com/a");

        let url = frontier.next_url(7).unwrap();
        // Assigned URLs cannot re-enter the queue.
        assert!(!frontier.add_url(&url));
        assert!(!frontier.is_queued(&url));

        frontier.mark_processed(&url);
        assert!(frontier.is_processed(&url));
        assert!(!frontier.add_url(&url));
        assert_eq!(frontier.assigned_count(7), 0);
    }

    #[test]
    fn fifo_order() {
        let frontier = seeded();
        frontier.add_url("http://books.toscrape.com/a");
        frontier.add_url("http://books.toscrape.com/b");

        assert_eq!(frontier.next_url(1).unwrap(), "http://books.toscrape.com/");
        assert_eq!(frontier.next_url(1).unwrap(), "http://books.toscrape.com/a");
        assert_eq!(frontier.next_url(1).unwrap(), "http://books.toscrape.com/b");
        assert!(frontier.next_url(1).is_none());
    }

    #[test]
    fn reassignment_is_complete() {
        let frontier = seeded();
        frontier.add_url("http://books.toscrape.com/a");
        frontier.add_url("http://books.toscrape.com/b");

        let _seed = frontier.next_url(1).unwrap();
        let _a = frontier.next_url(1).unwrap();
        let _b = frontier.next_url(2).unwrap();
        assert_eq!(frontier.queue_size(), 0);
        assert_eq!(frontier.assigned_count(1), 2);

        let reassigned = frontier.reassign_from(1);
        assert_eq!(reassigned, 2);
        assert_eq!(frontier.assigned_count(1), 0);
        assert_eq!(frontier.queue_size(), 2);
        assert_eq!(frontier.assigned_count(2), 1);
    }

    #[test]
    fn double_mark_processed_is_stable() {
        let frontier = seeded();
        let url = frontier.next_url(1).unwrap();
        frontier.mark_processed(&url);
        frontier.mark_processed(&url);
        assert_eq!(frontier.processed_count(), 1);
    }

    #[test]
    fn seed_reset_clears_everything() {
        let frontier = seeded();
        frontier.add_url("http://books.toscrape.com/a");
        let url = frontier.next_url(1).unwrap();
        frontier.mark_processed(&url);
        frontier.add_book(BookRecord {
            title: "A".to_string(),
            price: "£1.00".to_string(),
            rating: "One".to_string(),
            url: "http://books.toscrape.com/a".to_string(),
        });

        frontier.set_seed("https://blog.example.com/");
        assert_eq!(frontier.queue_size(), 0);
        assert_eq!(frontier.processed_count(), 0);
        assert_eq!(frontier.book_count(), 0);
        assert_eq!(frontier.item_count(), 0);
        assert_eq!(frontier.hostname(), "blog.example.com");
        assert_eq!(frontier.item_type(), ItemType::Article);
    }

    #[test]
    fn book_dedup_ignores_url() {
        let frontier = seeded();
        let book = BookRecord {
            title: "A".to_string(),
            price: "£10.00".to_string(),
            rating: "Three".to_string(),
            url: "http://books.toscrape.com/a".to_string(),
        };
        let mut mirror = book.clone();
        mirror.url = "http://books.toscrape.com/mirror/a".to_string();

        frontier.add_book(book);
        frontier.add_book(mirror);
        assert_eq!(frontier.book_count(), 1);
        assert_eq!(frontier.item_count(), 1);
    }

    #[test]
    fn item_dedup_on_key() {
        let frontier = seeded();
        let book = BookRecord {
            title: "A".to_string(),
            price: "£10.00".to_string(),
            rating: "Three".to_string(),
            url: "http://books.toscrape.com/a".to_string(),
        };
        frontier.add_item(Item::from_book(&book));
        let mut mirror = book;
        mirror.url = "http://books.toscrape.com/b".to_string();
        frontier.add_item(Item::from_book(&mirror));

        assert_eq!(frontier.item_count(), 1);
        // Book items are mirrored into the legacy book collection.
        assert_eq!(frontier.book_count(), 1);
    }
}
