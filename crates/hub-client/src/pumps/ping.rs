//! Hub keep-alive pump: periodic ping records.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use hubwire_protocol::Frame;

use super::write::Outbound;

/// Sends a hub ping every `period` so the server keeps the connection.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<Outbound>,
    period: Duration,
    cancel: CancellationToken,
) {
    if period.is_zero() {
        debug!("keep-alive disabled");
        return;
    }
    let record = match Frame::Ping.to_record() {
        Ok(r) => r,
        Err(e) => {
            error!("failed to encode ping: {e}");
            return;
        }
    };

    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let ping = Outbound::new(tungstenite::Message::Text(record.clone().into()));
                if write_tx.send(ping).await.is_err() {
                    break;
                }
            }
        }
    }
}
