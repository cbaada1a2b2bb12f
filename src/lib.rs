//! dcrawl: distributed single-domain web crawler.
//!
//! One coordinator owns the global crawl frontier, deduplicates URLs and
//! extracted items, and tracks worker liveness; any number of workers hold a
//! long-lived TCP connection to it, repeatedly pulling a URL, fetching and
//! parsing the page, and pushing back the extracted record plus discovered
//! links. A small HTTP API starts the crawl, changes the seed URL, and
//! reports status.

pub mod canonical;
pub mod config;
pub mod coordinator;
pub mod protocol;
pub mod types;
pub mod worker;

pub use config::Config;
pub use types::{BookRecord, Item, ItemType, StatusSnapshot, WorkerRecord};
