//! Progress heartbeat.
//!
//! A background task that reports the cumulative processed-page count every
//! couple of seconds. The shared connection is single-writer: when the main
//! crawl loop holds it, the tick is skipped and the count is reported on a
//! later tick instead.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::connection::Connection;
use super::SharedState;
use crate::protocol::{CoordinatorMessage, WorkerMessage};

pub async fn run(
    connection: Arc<Connection>,
    state: Arc<SharedState>,
    interval: Duration,
    ack_timeout: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_reported = 0u64;

    loop {
        ticker.tick().await;
        if state.stopped() {
            break;
        }

        let current = state.pages();
        if current == last_reported {
            continue;
        }

        let result = connection
            .try_call(&WorkerMessage::Progress(current), Some(ack_timeout))
            .await;

        match result {
            None => {
                // Main loop owns the connection; report on a later tick.
                continue;
            }
            Some(Ok(CoordinatorMessage::Ack)) => {
                debug!(pages = current, "progress reported");
                last_reported = current;
            }
            Some(Ok(CoordinatorMessage::Shutdown)) => {
                warn!("coordinator requested shutdown during progress report");
                state.request_shutdown();
                break;
            }
            Some(Ok(CoordinatorMessage::Wait | CoordinatorMessage::Url(_))) => {
                // Stale reply to an earlier request; the count will be
                // reported again next tick.
                debug!("tolerating out-of-sequence reply to progress report");
            }
            Some(Ok(other)) => {
                debug!(reply = %other.encode(), "unexpected reply to progress report");
            }
            Some(Err(e)) => {
                warn!(error = %e, "progress report failed, stopping worker");
                state.request_stop();
                break;
            }
        }
    }

    debug!("heartbeat stopped");
}
