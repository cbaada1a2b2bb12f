//! Per-worker protocol session.
//!
//! One task per accepted connection. Messages on a connection are handled
//! strictly in order and answered in the same order; a closed or failed read
//! is the signal that the worker abandoned its in-flight URLs.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::control::ControlPlane;
use crate::protocol::{read_message, write_message, CoordinatorMessage, WorkerMessage};

pub async fn run_session(stream: TcpStream, peer: SocketAddr, control: Arc<ControlPlane>) {
    info!(%peer, "worker connected");

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut worker_id: Option<u64> = None;

    loop {
        let line = match read_message(&mut reader).await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(%peer, "worker closed connection");
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "read error on worker connection");
                break;
            }
        };

        let message = match WorkerMessage::parse(&line) {
            Ok(message) => message,
            Err(e) => {
                // Unknown verbs are logged and otherwise ignored.
                warn!(%peer, error = %e, "ignoring unparseable message");
                continue;
            }
        };

        if let Some(id) = worker_id {
            control.registry().touch(id);
        }

        let response = match dispatch(message, &mut worker_id, peer, &control) {
            Some(response) => response,
            None => continue,
        };

        if let Err(e) = write_message(&mut write_half, &response.encode()).await {
            warn!(%peer, error = %e, "failed to send response");
            break;
        }

        if control.is_shutting_down() {
            let _ = write_message(&mut write_half, &CoordinatorMessage::Shutdown.encode()).await;
            break;
        }
    }

    if let Some(id) = worker_id {
        control.registry().disconnect(id);
        control.frontier().reassign_from(id);
    }
}

/// Compute the response for one message. `None` means no response is sent
/// (messages from unregistered workers are dropped).
fn dispatch(
    message: WorkerMessage,
    worker_id: &mut Option<u64>,
    peer: SocketAddr,
    control: &ControlPlane,
) -> Option<CoordinatorMessage> {
    if worker_id.is_none() && !matches!(message, WorkerMessage::Register) {
        warn!(%peer, "dropping message from unregistered worker");
        return None;
    }

    match message {
        WorkerMessage::Register => {
            let id = control
                .registry()
                .register(&peer.ip().to_string(), peer.port());
            *worker_id = Some(id);
            Some(CoordinatorMessage::AssignId(id))
        }
        WorkerMessage::GetUrl => {
            let id = (*worker_id)?;
            if !control.is_enabled() {
                return Some(CoordinatorMessage::Wait);
            }
            match control.frontier().next_url(id) {
                Some(url) => Some(CoordinatorMessage::Url(url)),
                None if control.is_shutting_down() => Some(CoordinatorMessage::Shutdown),
                None => Some(CoordinatorMessage::Wait),
            }
        }
        WorkerMessage::Processed { url, record } => {
            let id = (*worker_id)?;
            if control.is_enabled() {
                control.frontier().mark_processed(&url);
                control.registry().increment_processed(id);
                if !record.is_empty() {
                    control.registry().add_stats(id, 0, true);
                    control.frontier().add_book(record);
                }
                debug!(worker_id = id, url = %url, "page processed");
            }
            Some(CoordinatorMessage::Ack)
        }
        WorkerMessage::Links {
            batch,
            total,
            url,
            links,
        } => {
            let id = (*worker_id)?;
            if control.is_enabled() {
                let (added, skipped) = control.frontier().add_urls(&links);
                control.registry().add_stats(id, added as u64, false);
                debug!(
                    worker_id = id,
                    url = %url,
                    batch,
                    total,
                    added,
                    skipped,
                    "links batch received"
                );
            }
            Some(CoordinatorMessage::Ack)
        }
        WorkerMessage::Progress(count) => {
            let id = (*worker_id)?;
            control.registry().update_progress(id, count);
            debug!(worker_id = id, pages = count, "progress update");
            Some(CoordinatorMessage::Ack)
        }
    }
}
