//! One hub connection over a WebSocket.
//!
//! Performs the upgrade and the hub handshake, then hands the socket to
//! the read, write and ping pumps. Outbound invocations go through the
//! write pump and resolve once the frame has been written.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use hubwire_protocol::{Frame, HandshakeRequest, HubMethod, Invocation, parse_handshake_response};

use crate::dispatch::DispatchTable;
use crate::endpoint::Endpoint;
use crate::error::HubError;
use crate::pumps::read::CloseCallback;
use crate::pumps::write::{Outbound, WriteAck};
use crate::types::ConnectionConfig;

/// Upper bound for flushing the close frame in [`HubConnection::stop`].
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the outbound queue.
const WRITE_QUEUE: usize = 256;

/// Cheap handle for sending invocations on a connection.
#[derive(Clone)]
pub(crate) struct HubSender {
    write_tx: mpsc::Sender<Outbound>,
}

impl HubSender {
    /// Sends a fire-and-forget invocation and waits until it is written.
    pub(crate) async fn invoke(&self, method: HubMethod, arguments: &[&str]) -> Result<(), HubError> {
        let frame = Frame::Invocation(Invocation::non_blocking(
            method.as_str(),
            arguments.iter().copied(),
        ));
        let record = frame.to_record()?;
        let (outbound, ack) = Outbound::with_ack(tungstenite::Message::Text(record.into()));
        self.write_tx
            .send(outbound)
            .await
            .map_err(|_| HubError::Closed)?;
        await_ack(ack).await
    }
}

async fn await_ack(ack: WriteAck) -> Result<(), HubError> {
    match ack.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(HubError::SendFailed(e)),
        Err(_) => Err(HubError::Closed),
    }
}

/// An open hub connection.
///
/// Dropping it cancels and aborts the pumps.
pub(crate) struct HubConnection {
    write_tx: mpsc::Sender<Outbound>,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: CancellationToken,
    /// Cancelled by the read pump right before `on_close` runs.
    closed: CancellationToken,
}

impl HubConnection {
    /// Opens the WebSocket, performs the hub handshake and starts the pumps.
    ///
    /// `on_close` runs once when the read pump exits. `cancel` stops the
    /// pumps; pass a child of a longer-lived token to tie them to it.
    pub(crate) async fn connect(
        endpoint: &Endpoint,
        config: &ConnectionConfig,
        dispatch: Arc<DispatchTable>,
        on_close: CloseCallback,
        cancel: CancellationToken,
    ) -> Result<Self, HubError> {
        let request = endpoint.request()?;
        debug!(url = %endpoint.url(), "opening hub connection");

        let (mut ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        let leftover = tokio::time::timeout(config.handshake_timeout, handshake(&mut ws_stream))
            .await
            .map_err(|_| HubError::HandshakeTimeout)??;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<Outbound>(WRITE_QUEUE);

        let closed = CancellationToken::new();
        let on_close: CloseCallback = {
            let closed = closed.clone();
            Arc::new(move |reason| {
                closed.cancel();
                on_close(reason);
            })
        };

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read,
                leftover,
                dispatch,
                on_close,
                config.server_timeout,
                cancel,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(
                write_tx,
                config.keep_alive_interval,
                cancel,
            ))
        };

        info!(url = %endpoint.url(), "hub connection open");
        Ok(Self {
            write_tx,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
            closed,
        })
    }

    /// Returns `true` once the read pump has exited.
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub(crate) fn sender(&self) -> HubSender {
        HubSender {
            write_tx: self.write_tx.clone(),
        }
    }

    /// Writes a close frame, then cancels the pumps.
    ///
    /// Queueing and writing the close frame share one [`STOP_TIMEOUT`].
    /// The pumps are cancelled even when the close frame cannot be written.
    pub(crate) async fn stop(&self) -> Result<(), HubError> {
        let (outbound, ack) = Outbound::with_ack(tungstenite::Message::Close(None));
        let close = async {
            self.write_tx
                .send(outbound)
                .await
                .map_err(|_| HubError::Closed)?;
            await_ack(ack).await
        };
        let result = tokio::time::timeout(STOP_TIMEOUT, close)
            .await
            .unwrap_or(Err(HubError::Closed));
        self.cancel.cancel();
        result
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}

#[cfg(test)]
impl HubConnection {
    /// Connection with no socket behind it. The caller owns the receiving
    /// end of the write queue.
    pub(crate) fn detached(queue: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (write_tx, write_rx) = mpsc::channel(queue);
        let connection = Self {
            write_tx,
            _read_handle: tokio::spawn(async {}),
            _write_handle: tokio::spawn(async {}),
            _ping_handle: tokio::spawn(async {}),
            cancel: CancellationToken::new(),
            closed: CancellationToken::new(),
        };
        (connection, write_rx)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.cancel();
    }
}

/// Sends the handshake request and waits for the answer.
///
/// Returns whatever records followed the answer in the same message.
async fn handshake<S>(ws: &mut S) -> Result<String, HubError>
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>>
        + SinkExt<tungstenite::Message, Error = tungstenite::Error>
        + Unpin,
{
    let request = HandshakeRequest::json().to_record()?;
    ws.send(tungstenite::Message::Text(request.into())).await?;

    let mut buffer = String::new();
    loop {
        match ws.next().await {
            Some(Ok(tungstenite::Message::Text(text))) => {
                buffer.push_str(&text);
                if let Some((response, rest)) = parse_handshake_response(&buffer)? {
                    if let Some(error) = response.error {
                        return Err(HubError::HandshakeRejected(error));
                    }
                    debug!("hub handshake complete");
                    return Ok(rest.to_string());
                }
            }
            Some(Ok(tungstenite::Message::Close(_))) | None => return Err(HubError::Closed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{Sink, Stream};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Duplex mock: records what is written, replays scripted reads.
    struct ScriptedSocket {
        reads: Vec<tungstenite::Message>,
        written: Vec<tungstenite::Message>,
    }

    impl ScriptedSocket {
        fn new(reads: Vec<&str>) -> Self {
            Self {
                reads: reads
                    .into_iter()
                    .rev()
                    .map(|s| tungstenite::Message::Text(s.into()))
                    .collect(),
                written: Vec::new(),
            }
        }
    }

    impl Stream for ScriptedSocket {
        type Item = Result<tungstenite::Message, tungstenite::Error>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Ready(self.reads.pop().map(Ok))
        }
    }

    impl Sink<tungstenite::Message> for ScriptedSocket {
        type Error = tungstenite::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(mut self: Pin<&mut Self>, item: tungstenite::Message) -> Result<(), Self::Error> {
            self.written.push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn handshake_sends_json_protocol_request() {
        let mut socket = ScriptedSocket::new(vec!["{}\u{1e}"]);
        let leftover = handshake(&mut socket).await.unwrap();
        assert!(leftover.is_empty());
        assert_eq!(
            socket.written,
            vec![tungstenite::Message::Text(
                "{\"protocol\":\"json\",\"version\":1}\u{1e}".into()
            )]
        );
    }

    #[tokio::test]
    async fn handshake_returns_trailing_records() {
        let mut socket = ScriptedSocket::new(vec!["{}\u{1e}{\"type\":6}\u{1e}"]);
        let leftover = handshake(&mut socket).await.unwrap();
        assert_eq!(leftover, "{\"type\":6}\u{1e}");
    }

    #[tokio::test]
    async fn handshake_answer_may_span_messages() {
        let mut socket = ScriptedSocket::new(vec!["{", "}\u{1e}"]);
        assert!(handshake(&mut socket).await.is_ok());
    }

    #[tokio::test]
    async fn handshake_error_is_rejection() {
        let mut socket =
            ScriptedSocket::new(vec!["{\"error\":\"Requested protocol 'json' is not available.\"}\u{1e}"]);
        let err = handshake(&mut socket).await.unwrap_err();
        assert!(matches!(err, HubError::HandshakeRejected(msg) if msg.contains("not available")));
    }

    #[tokio::test]
    async fn handshake_fails_when_stream_ends() {
        let mut socket = ScriptedSocket::new(vec![]);
        assert!(matches!(
            handshake(&mut socket).await,
            Err(HubError::Closed)
        ));
    }

    #[tokio::test]
    async fn sender_invokes_through_write_queue() {
        let (write_tx, mut write_rx) = mpsc::channel::<Outbound>(4);
        let sender = HubSender { write_tx };

        let send = tokio::spawn(async move {
            sender.invoke(HubMethod::SendMessage, &["hello"]).await
        });

        let outbound = write_rx.recv().await.unwrap();
        let tungstenite::Message::Text(text) = &outbound.message else {
            panic!("expected text frame");
        };
        let json: serde_json::Value =
            serde_json::from_str(text.as_str().trim_end_matches('\u{1e}')).unwrap();
        assert_eq!(json["type"], 1);
        assert_eq!(json["target"], "SendMessage");
        assert_eq!(json["arguments"], serde_json::json!(["hello"]));

        outbound.ack.unwrap().send(Ok(())).unwrap();
        assert!(send.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn sender_on_closed_queue_fails() {
        let (write_tx, write_rx) = mpsc::channel::<Outbound>(4);
        drop(write_rx);
        let sender = HubSender { write_tx };
        assert!(matches!(
            sender.invoke(HubMethod::SendNotification, &["x"]).await,
            Err(HubError::Closed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_bounded_when_write_queue_is_full() {
        let (connection, _write_rx) = HubConnection::detached(1);
        connection
            .write_tx
            .send(Outbound::new(tungstenite::Message::Text("{}".into())))
            .await
            .unwrap();

        let result = connection.stop().await;
        assert!(matches!(result, Err(HubError::Closed)));
        assert!(connection.cancel.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_bounded_when_write_never_completes() {
        let (connection, mut write_rx) = HubConnection::detached(4);
        let stop = connection.stop();
        tokio::pin!(stop);

        // Hold the close frame without acking it.
        let held = tokio::select! {
            outbound = write_rx.recv() => outbound.unwrap(),
            _ = &mut stop => panic!("stop returned before the frame was queued"),
        };
        assert!(matches!(held.message, tungstenite::Message::Close(None)));

        assert!(matches!(stop.await, Err(HubError::Closed)));
        assert!(connection.cancel.is_cancelled());
        drop(held);
    }

    #[tokio::test]
    async fn stop_acked_close_succeeds() {
        let (connection, mut write_rx) = HubConnection::detached(4);
        tokio::spawn(async move {
            if let Some(outbound) = write_rx.recv().await {
                let _ = outbound.ack.unwrap().send(Ok(()));
            }
        });

        connection.stop().await.unwrap();
        assert!(connection.cancel.is_cancelled());
        assert!(!connection.is_closed());
    }
}
