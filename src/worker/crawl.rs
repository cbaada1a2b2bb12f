//! The main crawl loop: pull a URL, fetch and parse the page, report the
//! record and discovered links back to the coordinator.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::connection::{Connection, ConnectionError};
use super::dedup::{RecentRecords, SeenUrls};
use super::extractor;
use super::fetcher::PageFetcher;
use super::SharedState;
use crate::canonical;
use crate::config::WorkerConfig;
use crate::protocol::{CoordinatorMessage, WorkerMessage, LINKS_PER_BATCH};
use crate::types::BookRecord;

/// Consecutive transport errors tolerated before forcing a reconnect.
const MAX_CONSECUTIVE_ERRORS: u32 = 5;
/// Cap on the WAIT backoff multiplier.
const MAX_WAIT_BACKOFF: u32 = 10;
/// Attempts to deliver a PROCESSED report before giving up on the URL.
const PROCESSED_RETRIES: u32 = 3;

pub struct CrawlLoop {
    connection: Arc<Connection>,
    fetcher: PageFetcher,
    state: Arc<SharedState>,
    hostname: String,
    seen: SeenUrls,
    recent: RecentRecords,
    /// One-slot cache for a URL received out of sequence while awaiting an
    /// ACK; consumed instead of the next GET_URL.
    cached_url: Option<String>,
    wait_backoff: u32,
    consecutive_errors: u32,
    fetch_timeout: Duration,
    ack_timeout: Duration,
}

impl CrawlLoop {
    pub fn new(
        connection: Arc<Connection>,
        fetcher: PageFetcher,
        state: Arc<SharedState>,
        config: &WorkerConfig,
    ) -> Self {
        let seed = format!("http://{}/", canonical::crawl_host(&config.hostname));
        Self {
            connection,
            fetcher,
            state,
            hostname: config.hostname.clone(),
            seen: SeenUrls::new(&seed),
            recent: RecentRecords::default(),
            cached_url: None,
            wait_backoff: 0,
            consecutive_errors: 0,
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            ack_timeout: Duration::from_secs(config.ack_timeout_secs),
        }
    }

    /// Run until the stop flag is set (transport trouble, fetch timeout, or
    /// coordinator shutdown).
    pub async fn run(&mut self) {
        while !self.state.stopped() {
            match self.next_url().await {
                Some(url) => self.process(url).await,
                None => {
                    if !self.state.stopped() {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }

    /// Obtain the next URL to crawl, consuming the cached slot first.
    async fn next_url(&mut self) -> Option<String> {
        if let Some(cached) = self.cached_url.take() {
            self.wait_backoff = 0;
            self.consecutive_errors = 0;
            return self.sanitize(cached);
        }

        let mut response = match self.connection.call(&WorkerMessage::GetUrl, None).await {
            Ok(response) => response,
            Err(e) => {
                self.note_error(&e);
                return None;
            }
        };

        // An ACK here is a stale answer to an earlier request: re-issue the
        // GET_URL immediately and read once more.
        if response == CoordinatorMessage::Ack {
            debug!("stale ACK in idle state, re-requesting URL");
            response = match self.connection.call(&WorkerMessage::GetUrl, None).await {
                Ok(response) => response,
                Err(e) => {
                    self.note_error(&e);
                    return None;
                }
            };
        }

        match response {
            CoordinatorMessage::Url(url) => {
                self.wait_backoff = 0;
                self.consecutive_errors = 0;
                self.sanitize(url)
            }
            CoordinatorMessage::Wait => {
                let delay_secs = (3 * (self.wait_backoff as u64 + 1)).min(10);
                self.wait_backoff = (self.wait_backoff + 1).min(MAX_WAIT_BACKOFF);
                debug!(delay_secs, "no work available, backing off");
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                None
            }
            CoordinatorMessage::Shutdown => {
                info!("coordinator requested shutdown");
                self.state.request_shutdown();
                None
            }
            other => {
                warn!(reply = %other.encode(), "unexpected reply to GET_URL");
                self.consecutive_errors += 1;
                if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    warn!("too many consecutive errors, reconnecting");
                    self.state.request_stop();
                }
                None
            }
        }
    }

    /// Repair and validate a URL handed out by the coordinator.
    fn sanitize(&self, url: String) -> Option<String> {
        let fixed = canonical::repair(&url);
        if canonical::is_valid(&fixed) {
            Some(fixed)
        } else {
            warn!(url, "skipping invalid URL from coordinator");
            None
        }
    }

    /// Fetch, extract, and report one page.
    async fn process(&mut self, url: String) {
        // Locally seen pages still complete the protocol round so the
        // coordinator marks them processed.
        if self.seen.check_and_insert(&url) {
            debug!(url, "already processed locally, acknowledging without fetch");
            self.report(&url, BookRecord::default(), Vec::new()).await;
            return;
        }

        let fetched = match tokio::time::timeout(self.fetch_timeout, self.fetcher.fetch(&url)).await
        {
            Err(_) => {
                // A hung fetch poisons the whole connection: reconnect and
                // let the coordinator hand the URL to someone else.
                warn!(url, timeout_secs = self.fetch_timeout.as_secs(), "fetch timed out, forcing reconnect");
                self.state.request_stop();
                return;
            }
            Ok(Err(e)) => {
                warn!(url, error = %e, "fetch failed, reporting empty record");
                None
            }
            Ok(Ok(body)) => Some(body),
        };

        let (record, links) = match fetched {
            Some(body) => {
                self.state.add_pages(1);
                let mut record = extractor::extract_record(&body, &url);
                let links = extractor::extract_links(&body, &url, &self.hostname);
                if self.recent.check_and_insert(&record) {
                    record = BookRecord::default();
                }
                if !record.is_empty() {
                    info!(title = %record.title, price = %record.price, "found record");
                }
                (record, links)
            }
            // Fetch failures still complete processing so the URL is not
            // retried forever.
            None => (BookRecord::default(), Vec::new()),
        };

        self.report(&url, record, links).await;
    }

    /// Deliver the PROCESSED message and link batches, with retries.
    async fn report(&mut self, url: &str, record: BookRecord, links: Vec<String>) {
        for attempt in 1..=PROCESSED_RETRIES {
            if self.state.stopped() {
                return;
            }
            match self.send_report(url, &record, &links).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(url, attempt, error = %e, "failed to deliver report");
                    if attempt < PROCESSED_RETRIES {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
        // Give up on this URL; the coordinator never saw a PROCESSED, so it
        // will be reassigned after our next reconnect.
        warn!(url, "giving up on report after {PROCESSED_RETRIES} attempts");
    }

    async fn send_report(
        &mut self,
        url: &str,
        record: &BookRecord,
        links: &[String],
    ) -> Result<(), ConnectionError> {
        let processed = WorkerMessage::Processed {
            url: url.to_string(),
            record: record.clone(),
        };
        let reply = self
            .connection
            .call(&processed, Some(self.ack_timeout))
            .await?;
        if !self.handle_report_reply(reply)? {
            return Ok(());
        }

        if links.is_empty() {
            return Ok(());
        }

        let total = links.len().div_ceil(LINKS_PER_BATCH);
        for (index, batch) in links.chunks(LINKS_PER_BATCH).enumerate() {
            let message = WorkerMessage::Links {
                batch: index + 1,
                total,
                url: url.to_string(),
                links: batch.to_vec(),
            };
            let reply = self
                .connection
                .call(&message, Some(self.ack_timeout))
                .await?;
            if !self.handle_report_reply(reply)? {
                return Ok(());
            }
        }

        Ok(())
    }

    /// Interpret a reply during reporting. Returns Ok(false) to stop sending
    /// further frames for this page (shutdown), Ok(true) to continue.
    fn handle_report_reply(
        &mut self,
        reply: CoordinatorMessage,
    ) -> Result<bool, ConnectionError> {
        match reply {
            CoordinatorMessage::Ack => Ok(true),
            CoordinatorMessage::Url(url) => {
                // Out-of-sequence answer to a pending GET_URL: keep it for
                // the next idle step and treat this as an ACK.
                debug!(url = %url, "caching out-of-sequence URL");
                self.cached_url = Some(url);
                Ok(true)
            }
            CoordinatorMessage::Shutdown => {
                info!("coordinator requested shutdown during report");
                self.state.request_shutdown();
                Ok(false)
            }
            other => Err(ConnectionError::Unexpected(other.encode())),
        }
    }

    fn note_error(&mut self, error: &ConnectionError) {
        self.consecutive_errors += 1;
        warn!(
            error = %error,
            consecutive = self.consecutive_errors,
            "transport error talking to coordinator"
        );
        if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
            warn!("too many consecutive errors, reconnecting");
            self.state.request_stop();
        }
    }
}
