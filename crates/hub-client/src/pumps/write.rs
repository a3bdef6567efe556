//! WebSocket write pump: serialises outbound messages.

use futures_util::SinkExt;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Resolved once the message has been written to the socket.
pub(crate) type WriteAck = oneshot::Receiver<Result<(), String>>;

/// A message queued for the write pump.
pub(crate) struct Outbound {
    pub(crate) message: tungstenite::Message,
    pub(crate) ack: Option<oneshot::Sender<Result<(), String>>>,
}

impl Outbound {
    /// A message nobody waits on (pings).
    pub(crate) fn new(message: tungstenite::Message) -> Self {
        Self { message, ack: None }
    }

    /// A message whose write result is reported through the returned receiver.
    pub(crate) fn with_ack(message: tungstenite::Message) -> (Self, WriteAck) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                message,
                ack: Some(tx),
            },
            rx,
        )
    }
}

/// Writes messages to the WebSocket.
///
/// Stops after a write error or after writing a close frame. Queued
/// messages still waiting when the pump stops see their ack dropped.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = write_rx.recv() => {
                match next {
                    Some(Outbound { message, ack }) => {
                        let is_close = matches!(message, tungstenite::Message::Close(_));
                        let result = write.send(message).await;
                        let failed = result.is_err();
                        if let Err(e) = &result {
                            error!("WebSocket write error: {e}");
                        }
                        if let Some(ack) = ack {
                            let _ = ack.send(result.map_err(|e| e.to_string()));
                        }
                        if failed || is_close {
                            return;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    fn channel_sink(
        tx: mpsc::Sender<tungstenite::Message>,
    ) -> impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn write_pump_stops_on_cancel() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let cancel = CancellationToken::new();

        let (_write_tx, write_rx) = mpsc::channel(16);
        let c = cancel.clone();
        let handle = tokio::spawn(async move {
            write_pump(channel_sink(sink_tx), write_rx, c).await;
        });

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");

        let close_msg = sink_rx.recv().await;
        assert!(matches!(close_msg, Some(tungstenite::Message::Close(_))));
    }

    #[tokio::test]
    async fn write_pump_acks_after_writing() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let cancel = CancellationToken::new();
        let (write_tx, write_rx) = mpsc::channel(16);
        tokio::spawn(write_pump(channel_sink(sink_tx), write_rx, cancel.clone()));

        let (outbound, ack) = Outbound::with_ack(tungstenite::Message::Text("hello".into()));
        write_tx.send(outbound).await.unwrap();

        assert_eq!(ack.await.unwrap(), Ok(()));
        let written = sink_rx.recv().await.unwrap();
        assert_eq!(written, tungstenite::Message::Text("hello".into()));
        cancel.cancel();
    }

    #[tokio::test]
    async fn write_pump_reports_write_errors() {
        let failing = Box::pin(sink::unfold((), |(), _msg: tungstenite::Message| async move {
            Err::<(), _>(tungstenite::Error::ConnectionClosed)
        }));
        let (write_tx, write_rx) = mpsc::channel(16);
        let handle = tokio::spawn(write_pump(failing, write_rx, CancellationToken::new()));

        let (outbound, ack) = Outbound::with_ack(tungstenite::Message::Text("x".into()));
        write_tx.send(outbound).await.unwrap();

        assert!(ack.await.unwrap().is_err());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn close_message_ends_the_pump() {
        let (sink_tx, mut sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let (write_tx, write_rx) = mpsc::channel(16);
        let handle = tokio::spawn(write_pump(
            channel_sink(sink_tx),
            write_rx,
            CancellationToken::new(),
        ));

        let (outbound, ack) = Outbound::with_ack(tungstenite::Message::Close(None));
        write_tx.send(outbound).await.unwrap();
        assert_eq!(ack.await.unwrap(), Ok(()));
        handle.await.unwrap();

        // Exactly one close frame was written.
        assert!(matches!(
            sink_rx.recv().await,
            Some(tungstenite::Message::Close(_))
        ));
        assert!(sink_rx.recv().await.is_none());
    }
}
