//! Worker-side connection to the coordinator.
//!
//! A single task-safe owner of the socket. Every request/response exchange
//! happens as one atomic pair under the connection lock, so the heartbeat and
//! the main crawl loop can never interleave their frames. The heartbeat uses
//! `try_call` and skips its tick when the main loop holds the lock.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::protocol::{
    read_message, write_message, CoordinatorMessage, ProtocolError, WorkerMessage,
};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("coordinator closed the connection")]
    Closed,
    #[error("timed out waiting for coordinator response")]
    Timeout,
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

struct ConnectionInner {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ConnectionInner {
    async fn roundtrip(
        &mut self,
        message: &WorkerMessage,
        timeout: Option<Duration>,
    ) -> Result<CoordinatorMessage, ConnectionError> {
        write_message(&mut self.writer, &message.encode()).await?;

        let read = read_message(&mut self.reader);
        let line = match timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| ConnectionError::Timeout)??,
            None => read.await?,
        };

        let line = line.ok_or(ConnectionError::Closed)?;
        Ok(CoordinatorMessage::parse(&line)?)
    }
}

/// A registered connection to the coordinator.
pub struct Connection {
    inner: Mutex<ConnectionInner>,
}

impl Connection {
    /// Open a TCP connection to the coordinator.
    pub async fn open(server: &str, port: u16) -> Result<Self, ConnectionError> {
        let stream = TcpStream::connect((server, port)).await?;
        let (read_half, write_half) = stream.into_split();
        debug!(server, port, "connected to coordinator");
        Ok(Self {
            inner: Mutex::new(ConnectionInner {
                reader: BufReader::new(read_half),
                writer: write_half,
            }),
        })
    }

    /// Send REGISTER and return the assigned worker id.
    pub async fn register(&self) -> Result<u64, ConnectionError> {
        match self.call(&WorkerMessage::Register, None).await? {
            CoordinatorMessage::AssignId(id) => Ok(id),
            other => Err(ConnectionError::Unexpected(other.encode())),
        }
    }

    /// Perform one request/response pair, holding the connection for the
    /// whole exchange.
    pub async fn call(
        &self,
        message: &WorkerMessage,
        timeout: Option<Duration>,
    ) -> Result<CoordinatorMessage, ConnectionError> {
        let mut inner = self.inner.lock().await;
        inner.roundtrip(message, timeout).await
    }

    /// Like [`call`](Self::call), but yields to the main loop: returns `None`
    /// without sending when the connection is currently in use.
    pub async fn try_call(
        &self,
        message: &WorkerMessage,
        timeout: Option<Duration>,
    ) -> Option<Result<CoordinatorMessage, ConnectionError>> {
        let mut inner = self.inner.try_lock().ok()?;
        Some(inner.roundtrip(message, timeout).await)
    }
}
