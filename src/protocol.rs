//! Worker-coordinator wire protocol
//!
//! ASCII text messages, one per line. Each message is written with a single
//! `write_all` and terminated by `\n`; the receiver reads full lines through
//! a buffered reader. Field values are extracted by substring scan on the
//! literal `key:"` delimiters and must not contain `"` or newlines.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::BookRecord;

/// Upper bound on a single message, matching the receive buffer the protocol
/// was designed around. Link submissions are batched to stay under it.
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Maximum links per LINKS batch.
pub const LINKS_PER_BATCH: usize = 20;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown message verb: {0}")]
    UnknownVerb(String),
    #[error("missing field `{0}` in message")]
    MissingField(&'static str),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("message exceeds {MAX_MESSAGE_SIZE} bytes")]
    TooLarge,
}

/// Messages sent by a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMessage {
    /// Handshake; answered with `ASSIGN_ID:<n>`.
    Register,
    /// Request for work; answered with `URL:`, `WAIT`, or `SHUTDOWN`.
    GetUrl,
    /// A page is done, with the extracted record (possibly empty).
    Processed { url: String, record: BookRecord },
    /// Batch `batch` of `total` outbound links for a processed URL.
    Links {
        batch: usize,
        total: usize,
        url: String,
        links: Vec<String>,
    },
    /// Heartbeat carrying the cumulative processed-page count.
    Progress(u64),
}

impl WorkerMessage {
    pub fn encode(&self) -> String {
        match self {
            WorkerMessage::Register => "REGISTER".to_string(),
            WorkerMessage::GetUrl => "GET_URL".to_string(),
            WorkerMessage::Processed { url, record } => format!(
                "PROCESSED:{{url:\"{}\",book:{{title:\"{}\",price:\"{}\",rating:\"{}\",url:\"{}\"}}}}",
                url, record.title, record.price, record.rating, record.url
            ),
            WorkerMessage::Links {
                batch,
                total,
                url,
                links,
            } => {
                let quoted: Vec<String> = links.iter().map(|l| format!("\"{l}\"")).collect();
                format!(
                    "LINKS:{}/{}:{{url:\"{}\",links:[{}]}}",
                    batch,
                    total,
                    url,
                    quoted.join(",")
                )
            }
            WorkerMessage::Progress(count) => format!("PROGRESS:{count}"),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        if line == "REGISTER" {
            return Ok(WorkerMessage::Register);
        }
        if line == "GET_URL" {
            return Ok(WorkerMessage::GetUrl);
        }
        if let Some(data) = line.strip_prefix("PROCESSED:") {
            let url = field(data, "url:\"").ok_or(ProtocolError::MissingField("url"))?;
            let book = data
                .split_once("book:{")
                .map(|(_, rest)| rest)
                .ok_or(ProtocolError::MissingField("book"))?;
            let record = BookRecord {
                title: field(book, "title:\"").unwrap_or_default().to_string(),
                price: field(book, "price:\"").unwrap_or_default().to_string(),
                rating: field(book, "rating:\"").unwrap_or_default().to_string(),
                url: field(book, "url:\"").unwrap_or_default().to_string(),
            };
            return Ok(WorkerMessage::Processed {
                url: url.to_string(),
                record,
            });
        }
        if let Some(data) = line.strip_prefix("LINKS:") {
            let (batch_info, payload) = data
                .split_once(":{")
                .ok_or_else(|| ProtocolError::Malformed("LINKS without payload".to_string()))?;
            let (batch, total) = batch_info
                .split_once('/')
                .and_then(|(b, t)| Some((b.parse().ok()?, t.parse().ok()?)))
                .ok_or_else(|| ProtocolError::Malformed("bad LINKS batch counter".to_string()))?;
            let url = field(payload, "url:\"")
                .ok_or(ProtocolError::MissingField("url"))?
                .to_string();
            let links_str = payload
                .split_once("links:[")
                .map(|(_, rest)| rest)
                .and_then(|rest| rest.split_once(']').map(|(inner, _)| inner))
                .ok_or(ProtocolError::MissingField("links"))?;
            return Ok(WorkerMessage::Links {
                batch,
                total,
                url,
                links: parse_quoted_list(links_str),
            });
        }
        if let Some(count) = line.strip_prefix("PROGRESS:") {
            let count = count
                .trim()
                .parse()
                .map_err(|_| ProtocolError::Malformed(format!("bad progress count: {count}")))?;
            return Ok(WorkerMessage::Progress(count));
        }
        Err(ProtocolError::UnknownVerb(
            line.split(':').next().unwrap_or(line).to_string(),
        ))
    }
}

/// Messages sent by the coordinator to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorMessage {
    AssignId(u64),
    Url(String),
    Wait,
    Ack,
    Shutdown,
}

impl CoordinatorMessage {
    pub fn encode(&self) -> String {
        match self {
            CoordinatorMessage::AssignId(id) => format!("ASSIGN_ID:{id}"),
            CoordinatorMessage::Url(url) => format!("URL:{url}"),
            CoordinatorMessage::Wait => "WAIT".to_string(),
            CoordinatorMessage::Ack => "ACK".to_string(),
            CoordinatorMessage::Shutdown => "SHUTDOWN".to_string(),
        }
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        if let Some(id) = line.strip_prefix("ASSIGN_ID:") {
            let id = id
                .trim()
                .parse()
                .map_err(|_| ProtocolError::Malformed(format!("bad worker id: {id}")))?;
            return Ok(CoordinatorMessage::AssignId(id));
        }
        if let Some(url) = line.strip_prefix("URL:") {
            return Ok(CoordinatorMessage::Url(url.to_string()));
        }
        if line == "WAIT" {
            return Ok(CoordinatorMessage::Wait);
        }
        // A doubled frame like ACKACK is truncated to a single ACK.
        if line.starts_with("ACK") {
            return Ok(CoordinatorMessage::Ack);
        }
        if line == "SHUTDOWN" {
            return Ok(CoordinatorMessage::Shutdown);
        }
        Err(ProtocolError::UnknownVerb(
            line.split(':').next().unwrap_or(line).to_string(),
        ))
    }
}

/// Extract a `key:"value"` field by locating the key prefix and taking bytes
/// until the next `"`.
fn field<'a>(data: &'a str, key: &str) -> Option<&'a str> {
    let start = data.find(key)? + key.len();
    let end = data[start..].find('"')? + start;
    Some(&data[start..end])
}

/// Parse a `"a","b","c"` quoted list by scanning quote pairs.
fn parse_quoted_list(data: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = data;
    while let Some(start) = rest.find('"') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('"') else { break };
        out.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    out
}

/// Write one message as a single line and flush.
pub async fn write_message<W>(writer: &mut W, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = String::with_capacity(message.len() + 1);
    frame.push_str(message);
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

/// Read one line-framed message. Returns `None` on a clean EOF.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<String>, io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let bytes = reader.read_line(&mut line).await?;
    if bytes == 0 {
        return Ok(None);
    }
    if bytes > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            ProtocolError::TooLarge,
        ));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_get_url_roundtrip() {
        assert_eq!(
            WorkerMessage::parse("REGISTER").unwrap(),
            WorkerMessage::Register
        );
        assert_eq!(
            WorkerMessage::parse("GET_URL").unwrap(),
            WorkerMessage::GetUrl
        );
        assert_eq!(WorkerMessage::Register.encode(), "REGISTER");
    }

    #[test]
    fn processed_roundtrip() {
        let msg = WorkerMessage::Processed {
            url: "http://books.toscrape.com/".to_string(),
            record: BookRecord {
                title: "A".to_string(),
                price: "£10.00".to_string(),
                rating: "Three".to_string(),
                url: "http://books.toscrape.com/a".to_string(),
            },
        };
        let encoded = msg.encode();
        assert_eq!(
            encoded,
            "PROCESSED:{url:\"http://books.toscrape.com/\",book:{title:\"A\",price:\"£10.00\",rating:\"Three\",url:\"http://books.toscrape.com/a\"}}"
        );
        assert_eq!(WorkerMessage::parse(&encoded).unwrap(), msg);
    }

    #[test]
    fn processed_with_empty_record() {
        let msg = WorkerMessage::Processed {
            url: "http://books.toscrape.com/x".to_string(),
            record: BookRecord::default(),
        };
        let parsed = WorkerMessage::parse(&msg.encode()).unwrap();
        match parsed {
            WorkerMessage::Processed { record, .. } => assert!(record.is_empty()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn links_roundtrip() {
        let msg = WorkerMessage::Links {
            batch: 2,
            total: 3,
            url: "http://books.toscrape.com/".to_string(),
            links: vec![
                "http://books.toscrape.com/a".to_string(),
                "http://books.toscrape.com/b".to_string(),
            ],
        };
        let encoded = msg.encode();
        assert_eq!(
            encoded,
            "LINKS:2/3:{url:\"http://books.toscrape.com/\",links:[\"http://books.toscrape.com/a\",\"http://books.toscrape.com/b\"]}"
        );
        assert_eq!(WorkerMessage::parse(&encoded).unwrap(), msg);
    }

    #[test]
    fn links_with_empty_list() {
        let parsed = WorkerMessage::parse("LINKS:1/1:{url:\"http://x/\",links:[]}").unwrap();
        match parsed {
            WorkerMessage::Links { links, .. } => assert!(links.is_empty()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn progress_roundtrip() {
        assert_eq!(
            WorkerMessage::parse("PROGRESS:42").unwrap(),
            WorkerMessage::Progress(42)
        );
        assert_eq!(WorkerMessage::Progress(7).encode(), "PROGRESS:7");
        assert!(WorkerMessage::parse("PROGRESS:x").is_err());
    }

    #[test]
    fn unknown_verb_is_rejected() {
        assert!(matches!(
            WorkerMessage::parse("FROBNICATE:1"),
            Err(ProtocolError::UnknownVerb(_))
        ));
    }

    #[test]
    fn coordinator_messages() {
        assert_eq!(
            CoordinatorMessage::parse("ASSIGN_ID:12").unwrap(),
            CoordinatorMessage::AssignId(12)
        );
        assert_eq!(
            CoordinatorMessage::parse("URL:http://books.toscrape.com/").unwrap(),
            CoordinatorMessage::Url("http://books.toscrape.com/".to_string())
        );
        assert_eq!(
            CoordinatorMessage::parse("WAIT").unwrap(),
            CoordinatorMessage::Wait
        );
        assert_eq!(
            CoordinatorMessage::parse("SHUTDOWN").unwrap(),
            CoordinatorMessage::Shutdown
        );
    }

    #[test]
    fn doubled_ack_is_truncated() {
        assert_eq!(
            CoordinatorMessage::parse("ACKACK").unwrap(),
            CoordinatorMessage::Ack
        );
        assert_eq!(
            CoordinatorMessage::parse("ACK").unwrap(),
            CoordinatorMessage::Ack
        );
    }

    #[tokio::test]
    async fn framing_roundtrip() {
        let (client, server) = tokio::io::duplex(1024);
        let (read_half, _keep) = tokio::io::split(server);
        let (_keep2, mut write_half) = tokio::io::split(client);

        write_message(&mut write_half, "GET_URL").await.unwrap();
        write_message(&mut write_half, "PROGRESS:3").await.unwrap();

        let mut reader = tokio::io::BufReader::new(read_half);
        assert_eq!(
            read_message(&mut reader).await.unwrap(),
            Some("GET_URL".to_string())
        );
        assert_eq!(
            read_message(&mut reader).await.unwrap(),
            Some("PROGRESS:3".to_string())
        );

        drop(write_half);
        drop(_keep);
        drop(_keep2);
        assert_eq!(read_message(&mut reader).await.unwrap(), None);
    }
}
