//! End-to-end coordinator scenarios over real TCP connections.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;

use dcrawl::coordinator::{ControlPlane, CrawlServer, Frontier, Registry};

/// A hand-driven worker client speaking the line-framed text protocol.
struct TestWorker {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestWorker {
    async fn connect(addr: std::net::SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    async fn send(&mut self, message: &str) {
        self.writer
            .write_all(format!("{message}\n").as_bytes())
            .await
            .unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> String {
        let mut line = String::new();
        let n = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for coordinator reply")
            .unwrap();
        assert!(n > 0, "coordinator closed the connection");
        line.trim_end().to_string()
    }

    async fn register(&mut self) -> String {
        self.send("REGISTER").await;
        self.recv().await
    }
}

struct Harness {
    control: Arc<ControlPlane>,
    addr: std::net::SocketAddr,
    _shutdown: broadcast::Sender<()>,
}

async fn start_coordinator() -> Harness {
    let frontier = Arc::new(Frontier::new("http://books.toscrape.com/"));
    let registry = Arc::new(Registry::new());
    let control = Arc::new(ControlPlane::new(frontier, registry));

    let server = CrawlServer::bind("127.0.0.1:0", control.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(server.run(shutdown_rx));

    Harness {
        control,
        addr,
        _shutdown: shutdown_tx,
    }
}

/// Poll until a condition holds, failing after a couple of seconds.
async fn wait_for(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn seed_start_one_worker_one_page() {
    let harness = start_coordinator().await;
    harness.control.start();

    let mut worker = TestWorker::connect(harness.addr).await;
    assert_eq!(worker.register().await, "ASSIGN_ID:1");

    worker.send("GET_URL").await;
    assert_eq!(worker.recv().await, "URL:http://books.toscrape.com/");

    worker
        .send(
            "PROCESSED:{url:\"http://books.toscrape.com/\",book:{title:\"A\",price:\"£10.00\",rating:\"Three\",url:\"http://books.toscrape.com/a\"}}",
        )
        .await;
    assert_eq!(worker.recv().await, "ACK");

    let frontier = harness.control.frontier();
    assert!(frontier.is_processed("http://books.toscrape.com/"));
    assert_eq!(frontier.book_count(), 1);

    let items = frontier.items_snapshot();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].rating, 3);
    assert_eq!(items[0].price, 10.0);
    assert_eq!(items[0].fields["price_original"], "£10.00");

    let status = harness.control.status();
    assert_eq!(status.books_found, 1);
    assert_eq!(status.processed_urls, 1);
}

#[tokio::test]
async fn two_workers_race_on_same_link() {
    let harness = start_coordinator().await;
    harness.control.start();

    let mut first = TestWorker::connect(harness.addr).await;
    assert_eq!(first.register().await, "ASSIGN_ID:1");
    let mut second = TestWorker::connect(harness.addr).await;
    assert_eq!(second.register().await, "ASSIGN_ID:2");

    // Drain the seed so the queue is empty.
    first.send("GET_URL").await;
    assert!(first.recv().await.starts_with("URL:"));

    first
        .send("LINKS:1/1:{url:\"http://books.toscrape.com/\",links:[\"http://books.toscrape.com/x\"]}")
        .await;
    assert_eq!(first.recv().await, "ACK");

    second
        .send("LINKS:1/1:{url:\"http://books.toscrape.com/\",links:[\"http://books.toscrape.com/x\"]}")
        .await;
    assert_eq!(second.recv().await, "ACK");

    // The second submission was silently dropped.
    assert_eq!(harness.control.frontier().queue_size(), 1);
}

#[tokio::test]
async fn disconnect_reassigns_in_flight_urls() {
    let harness = start_coordinator().await;
    harness.control.start();

    let mut first = TestWorker::connect(harness.addr).await;
    assert_eq!(first.register().await, "ASSIGN_ID:1");

    first.send("GET_URL").await;
    let url = first.recv().await;
    assert_eq!(url, "URL:http://books.toscrape.com/");
    assert_eq!(harness.control.frontier().queue_size(), 0);

    // Drop the connection with the URL still in flight.
    drop(first);

    let frontier = harness.control.frontier();
    wait_for(|| frontier.queue_size() == 1, "URL to return to the queue").await;
    assert_eq!(frontier.assigned_count(1), 0);

    // A second worker now receives the reassigned URL.
    let mut second = TestWorker::connect(harness.addr).await;
    assert_eq!(second.register().await, "ASSIGN_ID:2");
    second.send("GET_URL").await;
    assert_eq!(second.recv().await, "URL:http://books.toscrape.com/");
}

#[tokio::test]
async fn gate_off_returns_wait() {
    let harness = start_coordinator().await;
    // Gate stays closed: no start().

    let mut worker = TestWorker::connect(harness.addr).await;
    assert_eq!(worker.register().await, "ASSIGN_ID:1");

    worker.send("GET_URL").await;
    assert_eq!(worker.recv().await, "WAIT");
    assert_eq!(harness.control.frontier().queue_size(), 0);
}

#[tokio::test]
async fn empty_queue_returns_wait() {
    let harness = start_coordinator().await;
    harness.control.start();

    let mut worker = TestWorker::connect(harness.addr).await;
    assert_eq!(worker.register().await, "ASSIGN_ID:1");

    worker.send("GET_URL").await;
    assert!(worker.recv().await.starts_with("URL:"));
    worker.send("GET_URL").await;
    assert_eq!(worker.recv().await, "WAIT");
}

#[tokio::test]
async fn messages_before_register_are_dropped() {
    let harness = start_coordinator().await;
    harness.control.start();

    let mut worker = TestWorker::connect(harness.addr).await;
    // GET_URL before REGISTER must get no reply; the next REGISTER is
    // answered normally.
    worker.send("GET_URL").await;
    assert_eq!(worker.register().await, "ASSIGN_ID:1");
}

#[tokio::test]
async fn progress_updates_worker_stats() {
    let harness = start_coordinator().await;
    harness.control.start();

    let mut worker = TestWorker::connect(harness.addr).await;
    assert_eq!(worker.register().await, "ASSIGN_ID:1");

    worker.send("PROGRESS:17").await;
    assert_eq!(worker.recv().await, "ACK");

    let workers = harness.control.registry().snapshot();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].pages_processed, 17);
}

#[tokio::test]
async fn seed_reset_wipes_live_crawl() {
    let harness = start_coordinator().await;
    harness.control.start();

    let mut worker = TestWorker::connect(harness.addr).await;
    assert_eq!(worker.register().await, "ASSIGN_ID:1");
    worker.send("GET_URL").await;
    assert!(worker.recv().await.starts_with("URL:"));

    harness.control.set_seed("https://quotes.toscrape.com/").unwrap();

    let status = harness.control.status();
    assert_eq!(status.queue_size, 0);
    assert_eq!(status.processed_urls, 0);
    assert_eq!(status.seed_url, "https://quotes.toscrape.com/");
    assert_eq!(status.item_type, "Book");
}
