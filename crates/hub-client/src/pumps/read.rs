//! WebSocket read pump: splits records and dispatches incoming frames.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use hubwire_protocol::Frame;
use hubwire_protocol::framing::split_records;

use crate::dispatch::DispatchTable;
use crate::types::CloseReason;

/// Called once when the read pump exits.
pub(crate) type CloseCallback = Arc<dyn Fn(CloseReason) + Send + Sync>;

/// Reads messages from the WebSocket and dispatches them.
///
/// `initial` holds records that arrived together with the handshake
/// answer. Any incoming message resets the server-timeout deadline; if
/// nothing arrives within `server_timeout` the connection is considered
/// dead and the loop exits.
pub(crate) async fn read_pump<S>(
    mut read: S,
    initial: String,
    dispatch: Arc<DispatchTable>,
    on_close: CloseCallback,
    server_timeout: Duration,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let early_close = if initial.is_empty() {
        None
    } else {
        handle_text_message(&initial, &dispatch)
    };

    let reason = match early_close {
        Some(reason) => reason,
        None => {
            let deadline = tokio::time::sleep(server_timeout);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break CloseReason::Stopped,

                    () = &mut deadline => {
                        warn!("server timeout, connection dead");
                        break CloseReason::ServerTimeout;
                    }

                    msg = read.next() => {
                        match msg {
                            Some(Ok(msg)) => {
                                deadline.as_mut().reset(tokio::time::Instant::now() + server_timeout);

                                match msg {
                                    tungstenite::Message::Text(text) => {
                                        if let Some(reason) = handle_text_message(&text, &dispatch) {
                                            break reason;
                                        }
                                    }
                                    tungstenite::Message::Ping(_) => {
                                        // tungstenite queues the pong itself.
                                        trace!("received ping");
                                    }
                                    tungstenite::Message::Pong(_) => {
                                        trace!("received pong");
                                    }
                                    tungstenite::Message::Close(frame) => {
                                        debug!(?frame, "received close frame");
                                        break CloseReason::TransportClosed;
                                    }
                                    _ => {} // binary frames are not part of the JSON protocol
                                }
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket read error: {e}");
                                break CloseReason::TransportError(e.to_string());
                            }
                            None => {
                                debug!("WebSocket stream ended");
                                break CloseReason::TransportClosed;
                            }
                        }
                    }
                }
            }
        }
    };

    let reason = if cancel.is_cancelled() {
        CloseReason::Stopped
    } else {
        reason
    };
    on_close(reason);
}

/// Handles one text message. Returns a close reason if the server sent a
/// hub Close message; records after it are ignored.
fn handle_text_message(text: &str, dispatch: &DispatchTable) -> Option<CloseReason> {
    let records = match split_records(text) {
        Ok(r) => r,
        Err(e) => {
            warn!("dropping malformed message: {e}");
            return None;
        }
    };

    for record in records {
        match Frame::from_json(record) {
            Ok(Frame::Invocation(invocation)) => {
                if let Err(e) = dispatch.dispatch(&invocation) {
                    warn!(method = %invocation.target, "invocation not delivered: {e}");
                }
            }
            Ok(Frame::Ping) => trace!("received hub ping"),
            Ok(Frame::Completion(c)) => {
                debug!(invocation_id = %c.invocation_id, "ignoring completion");
            }
            Ok(Frame::Close(close)) => {
                info!(
                    error = ?close.error,
                    allow_reconnect = close.allow_reconnect,
                    "server closed the connection"
                );
                return Some(CloseReason::ServerClosed {
                    error: close.error,
                    allow_reconnect: close.allow_reconnect,
                });
            }
            Ok(Frame::Unsupported(kind)) => debug!(?kind, "ignoring unsupported frame"),
            Err(e) => warn!("failed to parse frame: {e}"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{HubEvents, UserStateChange};
    use futures_util::stream;
    use std::sync::Mutex;

    fn dispatch_with_logins() -> (Arc<DispatchTable>, Arc<Mutex<Vec<UserStateChange>>>) {
        let table = Arc::new(DispatchTable::new(Arc::new(HubEvents::default())).unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        table
            .events()
            .login
            .subscribe(move |e| s.lock().unwrap().push(e.clone()));
        (table, seen)
    }

    fn recording_close() -> (CloseCallback, Arc<Mutex<Option<CloseReason>>>) {
        let closed = Arc::new(Mutex::new(None));
        let c = closed.clone();
        let cb: CloseCallback = Arc::new(move |reason| {
            *c.lock().unwrap() = Some(reason);
        });
        (cb, closed)
    }

    fn text(s: &str) -> Result<tungstenite::Message, tungstenite::Error> {
        Ok(tungstenite::Message::Text(s.into()))
    }

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn batched_records_dispatch_in_order() {
        let (table, seen) = dispatch_with_logins();
        let msg = "{\"type\":1,\"target\":\"Connect\",\"arguments\":[\"c-1\",\"alice\"]}\u{1e}\
                   {\"type\":6}\u{1e}\
                   {\"type\":1,\"target\":\"Connect\",\"arguments\":[\"c-2\",\"bob\"]}\u{1e}";

        assert!(handle_text_message(msg, &table).is_none());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].user_name, "alice");
        assert_eq!(seen[1].user_name, "bob");
    }

    #[test]
    fn malformed_records_are_skipped() {
        let (table, seen) = dispatch_with_logins();
        let msg = "garbage\u{1e}{\"type\":1,\"target\":\"Connect\",\"arguments\":[\"c\",\"u\"]}\u{1e}";
        assert!(handle_text_message(msg, &table).is_none());
        assert_eq!(seen.lock().unwrap().len(), 1);

        assert!(handle_text_message("no terminator", &table).is_none());
    }

    #[test]
    fn close_record_stops_processing() {
        let (table, seen) = dispatch_with_logins();
        let msg = "{\"type\":7,\"error\":\"bye\"}\u{1e}\
                   {\"type\":1,\"target\":\"Connect\",\"arguments\":[\"c\",\"u\"]}\u{1e}";
        assert_eq!(
            handle_text_message(msg, &table),
            Some(CloseReason::ServerClosed {
                error: Some("bye".into()),
                allow_reconnect: false
            })
        );
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_pump_dispatches_then_reports_stream_end() {
        let (table, seen) = dispatch_with_logins();
        let (on_close, closed) = recording_close();
        let messages = stream::iter(vec![
            text("{\"type\":1,\"target\":\"Connect\",\"arguments\":[\"c-1\",\"alice\"]}\u{1e}"),
            text("{\"type\":1,\"target\":\"Connect\",\"arguments\":[\"c-2\",\"bob\"]}\u{1e}"),
        ]);

        read_pump(
            messages,
            String::new(),
            table,
            on_close,
            TIMEOUT,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(*closed.lock().unwrap(), Some(CloseReason::TransportClosed));
    }

    #[tokio::test]
    async fn read_pump_processes_handshake_leftovers_first() {
        let (table, seen) = dispatch_with_logins();
        let (on_close, _closed) = recording_close();
        let messages = stream::iter(vec![text(
            "{\"type\":1,\"target\":\"Connect\",\"arguments\":[\"c-2\",\"second\"]}\u{1e}",
        )]);

        read_pump(
            messages,
            "{\"type\":1,\"target\":\"Connect\",\"arguments\":[\"c-1\",\"first\"]}\u{1e}".into(),
            table,
            on_close,
            TIMEOUT,
            CancellationToken::new(),
        )
        .await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].user_name, "first");
        assert_eq!(seen[1].user_name, "second");
    }

    #[tokio::test]
    async fn read_pump_reports_server_close_message() {
        let (table, _) = dispatch_with_logins();
        let (on_close, closed) = recording_close();
        let messages = stream::iter(vec![text("{\"type\":7,\"allowReconnect\":true}\u{1e}")])
            .chain(stream::pending());

        read_pump(
            Box::pin(messages),
            String::new(),
            table,
            on_close,
            TIMEOUT,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(
            *closed.lock().unwrap(),
            Some(CloseReason::ServerClosed {
                error: None,
                allow_reconnect: true
            })
        );
    }

    #[tokio::test]
    async fn read_pump_reports_stopped_on_cancel() {
        let (table, _) = dispatch_with_logins();
        let (on_close, closed) = recording_close();
        let cancel = CancellationToken::new();
        cancel.cancel();

        read_pump(
            stream::pending::<Result<tungstenite::Message, tungstenite::Error>>(),
            String::new(),
            table,
            on_close,
            TIMEOUT,
            cancel,
        )
        .await;

        assert_eq!(*closed.lock().unwrap(), Some(CloseReason::Stopped));
    }

    #[tokio::test]
    async fn read_pump_timeout_on_silence() {
        // With nothing arriving, the server timeout fires.
        tokio::time::pause();

        let (table, _) = dispatch_with_logins();
        let (on_close, closed) = recording_close();
        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();

        read_pump(
            silent,
            String::new(),
            table,
            on_close,
            TIMEOUT,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(*closed.lock().unwrap(), Some(CloseReason::ServerTimeout));
    }

    #[tokio::test]
    async fn read_pump_resets_deadline_on_any_message() {
        tokio::time::pause();

        let (table, _) = dispatch_with_logins();
        let (on_close, closed) = recording_close();

        // A hub ping arrives 1s before the deadline, then silence.
        let wait_before_msg = TIMEOUT - Duration::from_secs(1);
        let delayed = stream::once(async move {
            tokio::time::sleep(wait_before_msg).await;
            text("{\"type\":6}\u{1e}")
        });
        let combined = Box::pin(delayed.chain(stream::pending()));

        let handle = tokio::spawn(async move {
            read_pump(
                combined,
                String::new(),
                table,
                on_close,
                TIMEOUT,
                CancellationToken::new(),
            )
            .await;
        });

        tokio::time::advance(TIMEOUT + Duration::from_secs(1)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(
            closed.lock().unwrap().is_none(),
            "should not time out after the deadline was reset"
        );

        tokio::time::advance(TIMEOUT).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        handle.await.unwrap();
        assert_eq!(*closed.lock().unwrap(), Some(CloseReason::ServerTimeout));
    }
}
