//! Core data types shared by the coordinator and the worker.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of record a crawl target yields, inferred from the seed hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ItemType {
    Book,
    Job,
    Product,
    Article,
    #[default]
    Generic,
}

impl ItemType {
    /// Infer the item type from a hostname by substring patterns.
    pub fn infer(host: &str) -> Self {
        if host.contains("toscrape.com") {
            ItemType::Book
        } else if host.contains("indeed.com")
            || host.contains("linkedin.com")
            || host.contains("monster.com")
        {
            ItemType::Job
        } else if host.contains("amazon.com")
            || host.contains("ebay.com")
            || host.contains("walmart.com")
        {
            ItemType::Product
        } else if host.contains("medium.com") || host.contains("news.") || host.contains("blog.") {
            ItemType::Article
        } else {
            ItemType::Generic
        }
    }

    /// Human-readable label used in status output and CSV export.
    pub fn label(&self) -> &'static str {
        match self {
            ItemType::Book => "Book",
            ItemType::Job => "Job",
            ItemType::Product => "Product",
            ItemType::Article => "Article",
            ItemType::Generic => "Generic",
        }
    }
}

/// A raw book record as it travels on the wire: all fields are the original
/// strings scraped from the page (`price` like `£10.00`, `rating` like
/// `Three`). Empty fields mean the page yielded nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookRecord {
    pub title: String,
    pub price: String,
    pub rating: String,
    pub url: String,
}

impl BookRecord {
    /// Whether the record carries any extracted content.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
    }
}

/// A typed record extracted from one page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Identity key, the canonical source URL.
    pub id: String,
    pub item_type: ItemType,
    pub url: String,
    pub title: String,
    /// Type-specific fields (`company`, `location`, `salary`, `author`) plus
    /// the unparsed `price_original` / `rating_original` strings.
    pub fields: BTreeMap<String, String>,
    pub category: String,
    /// Parsed decimal price, 0 when absent or unparseable.
    pub price: f64,
    /// Parsed rating, 0-5.
    pub rating: u8,
    pub description: String,
    pub image_url: String,
    pub date: String,
}

impl Item {
    pub fn new(item_type: ItemType) -> Self {
        Self {
            id: String::new(),
            item_type,
            url: String::new(),
            title: String::new(),
            fields: BTreeMap::new(),
            category: String::new(),
            price: 0.0,
            rating: 0,
            description: String::new(),
            image_url: String::new(),
            date: String::new(),
        }
    }

    /// Build an item from a raw book record, normalizing the price and rating
    /// while preserving the original strings in `fields`.
    pub fn from_book(book: &BookRecord) -> Self {
        let mut item = Item::new(ItemType::Book);
        item.title = book.title.clone();
        item.url = book.url.clone();
        item.id = book.url.clone();
        item.price = parse_price(&book.price);
        item.rating = parse_rating_word(&book.rating);
        item.fields
            .insert("price_original".to_string(), book.price.clone());
        item.fields
            .insert("rating_original".to_string(), book.rating.clone());
        item
    }

    /// Deduplication key comparison: items collapse on
    /// `(type, title, price, rating)` regardless of URL, so mirror pages do
    /// not produce duplicates.
    pub fn same_key(&self, other: &Item) -> bool {
        self.item_type == other.item_type
            && self.title == other.title
            && self.price == other.price
            && self.rating == other.rating
    }
}

/// Parse a scraped price string (`£10.00`, `$1,299.99`) into a decimal.
/// Currency symbols and other non-digit lead characters are skipped; a comma
/// after the first digit is treated as a decimal point. Returns 0 on failure.
pub fn parse_price(raw: &str) -> f64 {
    let mut clean = String::new();
    let mut found_digit = false;

    for c in raw.chars() {
        if c.is_ascii_digit() {
            clean.push(c);
            found_digit = true;
        } else if (c == '.' || c == ',') && found_digit {
            clean.push('.');
        }
    }

    clean.parse().unwrap_or(0.0)
}

/// Map a rating word (`One`..`Five`) to its numeric value, 0 when unknown.
pub fn parse_rating_word(raw: &str) -> u8 {
    match raw {
        "One" => 1,
        "Two" => 2,
        "Three" => 3,
        "Four" => 4,
        "Five" => 5,
        _ => 0,
    }
}

/// Per-worker record kept by the coordinator's registry.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRecord {
    pub id: u64,
    pub address: String,
    pub port: u16,
    pub pages_processed: u64,
    pub books_found: u64,
    pub total_links: u64,
    pub start_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn new(id: u64, address: String, port: u16) -> Self {
        let now = Utc::now();
        Self {
            id,
            address,
            port,
            pages_processed: 0,
            books_found: 0,
            total_links: 0,
            start_time: now,
            last_seen: now,
        }
    }
}

/// Snapshot of the coordinator state, served by `GET /api/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub queue_size: usize,
    pub processed_urls: usize,
    pub books_found: usize,
    pub items_found: usize,
    pub workers: usize,
    pub seed_url: String,
    pub item_type: String,
    pub server_status: String,
}
