//! The realtime hub client.
//!
//! [`RealtimeClient`] owns one hub connection slot, re-emits inbound hub
//! methods as local events and exposes `send` / `notify` towards the
//! server.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hubwire_protocol::HubMethod;

use crate::connection::HubConnection;
use crate::cookies::CookieSource;
use crate::dispatch::DispatchTable;
use crate::endpoint::{Endpoint, Navigation};
use crate::error::HubError;
use crate::events::HubEvents;
use crate::reconnection::{HubContext, Install};
use crate::types::{ClientPhase, ConnectionConfig, ConnectionState};

/// Client for the `/signalRHub` realtime hub.
///
/// Subscribe to [`events`](Self::events) before calling
/// [`start`](Self::start); subscribers run on the connection's read task.
pub struct RealtimeClient {
    ctx: HubContext,
}

impl RealtimeClient {
    /// Creates a client for `{navigation.base_uri}/signalRHub` with the
    /// default transport settings.
    ///
    /// Request cookies, when given, are forwarded on the WebSocket upgrade
    /// scoped to the host of `navigation.uri`.
    pub fn new(
        navigation: &Navigation,
        cookies: Option<&dyn CookieSource>,
    ) -> Result<Self, HubError> {
        Self::with_config(navigation, cookies, ConnectionConfig::default())
    }

    /// Creates a client with explicit transport settings.
    pub fn with_config(
        navigation: &Navigation,
        cookies: Option<&dyn CookieSource>,
        config: ConnectionConfig,
    ) -> Result<Self, HubError> {
        let endpoint = Endpoint::from_navigation(navigation, cookies)?;
        let dispatch = DispatchTable::new(Arc::new(HubEvents::default()))?;
        info!(url = %endpoint.url(), "realtime client created");
        Ok(Self {
            ctx: HubContext::new(endpoint, config, dispatch),
        })
    }

    /// Local events raised by inbound hub methods.
    pub fn events(&self) -> &HubEvents {
        self.ctx.dispatch.events()
    }

    /// WebSocket URL of the hub.
    pub fn url(&self) -> &str {
        self.ctx.endpoint.url()
    }

    /// Lifecycle phase: not started, started or disposed.
    pub fn phase(&self) -> ClientPhase {
        self.ctx.phase()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.ctx.state_tx.borrow().clone()
    }

    /// Receiver that observes every connection state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.ctx.state_tx.subscribe()
    }

    /// Opens the hub connection.
    ///
    /// Only the first call connects; later calls return `Ok(())` right
    /// away, even if the first attempt failed. Fails with
    /// [`HubError::Cancelled`] when `cancel` fires first and with
    /// [`HubError::Disposed`] after [`dispose`](Self::dispose). If the hub
    /// closes the connection before it is in place the result is
    /// [`HubError::NotConnected`].
    pub async fn start(&self, cancel: Option<&CancellationToken>) -> Result<(), HubError> {
        if let Err(current) = self.ctx.phase.compare_exchange(
            ClientPhase::NotStarted as u8,
            ClientPhase::Started as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match ClientPhase::from_u8(current) {
                ClientPhase::Disposed => Err(HubError::Disposed),
                _ => {
                    debug!("start ignored, already started");
                    Ok(())
                }
            };
        }

        let cancel = cancel.cloned().unwrap_or_default();
        self.ctx.set_state(ConnectionState::Connecting);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HubError::Cancelled),
            _ = self.ctx.shutdown.cancelled() => Err(HubError::Disposed),
            result = self.ctx.open() => result,
        };

        match result {
            Ok(connection) => match self.ctx.install(connection).await {
                Install::Connected => Ok(()),
                Install::Disposed => Err(HubError::Disposed),
                Install::Closed => {
                    warn!(url = %self.url(), "hub closed the connection during start");
                    Err(HubError::NotConnected)
                }
            },
            Err(e) => {
                warn!(url = %self.url(), error = %e, "hub connection failed");
                if !self.ctx.is_disposed() {
                    self.ctx.set_state(ConnectionState::Disconnected);
                }
                Err(e)
            }
        }
    }

    /// Invokes `SendMessage(message)` on the server.
    ///
    /// Resolves once the frame has been written to the socket.
    pub async fn send(&self, message: &str) -> Result<(), HubError> {
        self.invoke(HubMethod::SendMessage, message).await
    }

    /// Invokes `SendNotification(message)` on the server.
    pub async fn notify(&self, message: &str) -> Result<(), HubError> {
        self.invoke(HubMethod::SendNotification, message).await
    }

    async fn invoke(&self, method: HubMethod, message: &str) -> Result<(), HubError> {
        if self.ctx.phase() == ClientPhase::Disposed {
            return Err(HubError::Disposed);
        }
        let sender = self
            .ctx
            .connection
            .lock()
            .await
            .as_ref()
            .filter(|connection| !connection.is_closed())
            .map(HubConnection::sender)
            .ok_or(HubError::NotConnected)?;
        debug!(%method, "invoking hub method");
        sender.invoke(method, &[message]).await
    }

    /// Stops the connection and releases it.
    ///
    /// Stop failures are logged. Safe to call more than once and on a
    /// client that never started.
    pub async fn dispose(&self) {
        let previous = self
            .ctx
            .phase
            .swap(ClientPhase::Disposed as u8, Ordering::AcqRel);
        if ClientPhase::from_u8(previous) == ClientPhase::Disposed {
            return;
        }

        let connection = self.ctx.connection.lock().await.take();
        if let Some(connection) = connection {
            if let Err(e) = connection.stop().await {
                warn!(error = %e, "hub connection did not stop cleanly");
            }
            drop(connection);
        }

        self.ctx.shutdown.cancel();
        self.ctx.state_tx.send_replace(ConnectionState::Disconnected);
        info!(url = %self.url(), "realtime client disposed");
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        self.ctx.shutdown.cancel();
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.url())
            .field("phase", &self.phase())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> RealtimeClient {
        RealtimeClient::new(&Navigation::new("http://127.0.0.1:9"), None).unwrap()
    }

    #[test]
    fn hub_url_is_base_plus_hub_path() {
        let client = RealtimeClient::new(&Navigation::new("https://app.example.com/"), None).unwrap();
        assert_eq!(client.url(), "wss://app.example.com/signalRHub");
        assert_eq!(client.phase(), ClientPhase::NotStarted);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn invalid_base_address_is_rejected() {
        let err = RealtimeClient::new(&Navigation::new("not a url"), None).unwrap_err();
        assert!(matches!(err, HubError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn send_before_start_is_not_connected() {
        let client = client();
        let err = client.send("hello").await.unwrap_err();
        assert!(matches!(err, HubError::NotConnected));
        let err = client.notify("hello").await.unwrap_err();
        assert!(matches!(err, HubError::NotConnected));
    }

    #[tokio::test]
    async fn dispose_without_start_is_terminal() {
        let client = client();
        client.dispose().await;
        assert_eq!(client.phase(), ClientPhase::Disposed);

        // Idempotent.
        client.dispose().await;
        assert_eq!(client.phase(), ClientPhase::Disposed);
    }

    #[tokio::test]
    async fn start_after_dispose_fails() {
        let client = client();
        client.dispose().await;
        let err = client.start(None).await.unwrap_err();
        assert!(matches!(err, HubError::Disposed));
        let err = client.send("hello").await.unwrap_err();
        assert!(matches!(err, HubError::Disposed));
    }

    #[tokio::test]
    async fn cancelled_token_aborts_start() {
        let client = client();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client.start(Some(&cancel)).await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(client.phase(), ClientPhase::Started);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // Later starts are no-ops.
        client.start(None).await.unwrap();
    }

    #[tokio::test]
    async fn failed_start_reports_connection_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RealtimeClient::new(&Navigation::new(format!("http://{addr}")), None).unwrap();
        let err = client.start(None).await.unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
