//! Automatic reconnection.
//!
//! Holds the shared [`HubContext`], the close callback installed on every
//! connection, and the reconnect loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::HubConnection;
use crate::dispatch::DispatchTable;
use crate::endpoint::Endpoint;
use crate::error::HubError;
use crate::pumps::read::CloseCallback;
use crate::types::{ClientPhase, CloseReason, ConnectionConfig, ConnectionState};

/// Shared state of a client, passed to the close callback and the
/// reconnect loop.
#[derive(Clone)]
pub(crate) struct HubContext {
    pub(crate) endpoint: Arc<Endpoint>,
    pub(crate) config: ConnectionConfig,
    pub(crate) dispatch: Arc<DispatchTable>,
    pub(crate) connection: Arc<Mutex<Option<HubConnection>>>,
    pub(crate) state_tx: Arc<watch::Sender<ConnectionState>>,
    pub(crate) phase: Arc<AtomicU8>,
    pub(crate) shutdown: CancellationToken,
}

impl HubContext {
    pub(crate) fn new(endpoint: Endpoint, config: ConnectionConfig, dispatch: DispatchTable) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            endpoint: Arc::new(endpoint),
            config,
            dispatch: Arc::new(dispatch),
            connection: Arc::new(Mutex::new(None)),
            state_tx: Arc::new(state_tx),
            phase: Arc::new(AtomicU8::new(ClientPhase::NotStarted as u8)),
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) fn phase(&self) -> ClientPhase {
        ClientPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.phase() == ClientPhase::Disposed || self.shutdown.is_cancelled()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        debug!(?state, "connection state");
        self.state_tx.send_replace(state);
    }

    /// Opens a connection whose unexpected close starts reconnection.
    pub(crate) async fn open(&self) -> Result<HubConnection, HubError> {
        HubConnection::connect(
            &self.endpoint,
            &self.config,
            self.dispatch.clone(),
            close_callback(self.clone()),
            self.shutdown.child_token(),
        )
        .await
    }

    /// Puts `connection` into the slot and marks the client connected.
    ///
    /// Both checks run under the slot lock. A connection opened during
    /// dispose is stopped; one whose read pump already exited is dropped
    /// and its close handling decides the state.
    pub(crate) async fn install(&self, connection: HubConnection) -> Install {
        let mut slot = self.connection.lock().await;
        if self.is_disposed() {
            drop(slot);
            if let Err(e) = connection.stop().await {
                debug!(error = %e, "stopping connection opened during dispose");
            }
            return Install::Disposed;
        }
        if connection.is_closed() {
            debug!("connection closed before it was installed");
            return Install::Closed;
        }
        *slot = Some(connection);
        self.set_state(ConnectionState::Connected);
        Install::Connected
    }
}

/// Outcome of [`HubContext::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Install {
    Connected,
    Disposed,
    Closed,
}

/// Builds the callback run when a connection's read pump exits.
///
/// The work happens on a spawned task that holds the slot lock, so it is
/// ordered with respect to [`HubContext::install`].
pub(crate) fn close_callback(ctx: HubContext) -> CloseCallback {
    Arc::new(move |reason: CloseReason| {
        tokio::spawn(handle_close(ctx.clone(), reason));
    })
}

async fn handle_close(ctx: HubContext, reason: CloseReason) {
    {
        let mut slot = ctx.connection.lock().await;
        if ctx.is_disposed() {
            debug!(?reason, "connection closed after dispose");
            return;
        }
        if slot.as_ref().is_some_and(HubConnection::is_closed) {
            slot.take();
        }
        if reason == CloseReason::Stopped {
            debug!("connection stopped locally");
            ctx.set_state(ConnectionState::Disconnected);
            return;
        }
        if !reason.should_reconnect() {
            info!(?reason, "hub connection closed, not reconnecting");
            ctx.set_state(ConnectionState::Disconnected);
            return;
        }
    }
    warn!(?reason, "hub connection lost, reconnecting");
    reconnect_loop(ctx).await;
}

/// Reconnects following the configured delays until it succeeds, the
/// policy runs out, or the client is disposed.
///
/// Returns a boxed future so the close callback of the new connection can
/// spawn this loop again.
pub(crate) fn reconnect_loop(ctx: HubContext) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let Some(delay) = ctx.config.reconnect.delay_for_attempt(attempt) else {
                warn!(attempts = attempt - 1, "reconnect attempts exhausted");
                ctx.set_state(ConnectionState::Disconnected);
                return;
            };
            ctx.set_state(ConnectionState::Reconnecting { attempt });

            let delay_secs = delay.as_secs_f64();
            info!(
                attempt,
                delay_secs = format_args!("{delay_secs:.1}"),
                "reconnecting"
            );

            tokio::select! {
                _ = ctx.shutdown.cancelled() => {
                    debug!("reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }
            if ctx.is_disposed() {
                return;
            }

            let result = tokio::select! {
                _ = ctx.shutdown.cancelled() => {
                    debug!("reconnect cancelled");
                    return;
                }
                result = ctx.open() => result,
            };

            match result {
                Ok(connection) => {
                    match ctx.install(connection).await {
                        Install::Connected => info!(attempt, "reconnected"),
                        Install::Closed => debug!(attempt, "reconnected connection closed at once"),
                        Install::Disposed => {}
                    }
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reconnect attempt failed");
                }
            }
        }
    })
}
