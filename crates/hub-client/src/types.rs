//! Public types for the realtime client.

use std::time::Duration;

use hubwire_protocol::constants::{
    DEFAULT_RECONNECT_DELAYS, HANDSHAKE_TIMEOUT, KEEP_ALIVE_INTERVAL, SERVER_TIMEOUT,
};

/// State of the hub connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// No open connection.
    Disconnected,
    /// WebSocket upgrade and handshake in progress.
    Connecting,
    /// Handshake completed; frames flow both ways.
    Connected,
    /// Connection lost, automatic reconnect in progress.
    Reconnecting { attempt: u32 },
}

/// Why a connection's read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Stopped locally (stop, dispose or drop).
    Stopped,
    /// Server sent a hub Close message.
    ServerClosed {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Server sent a WebSocket close frame or the stream ended.
    TransportClosed,
    /// Nothing arrived within the server timeout.
    ServerTimeout,
    /// The socket failed.
    TransportError(String),
}

impl CloseReason {
    /// Returns `true` if automatic reconnection should start.
    pub fn should_reconnect(&self) -> bool {
        match self {
            CloseReason::Stopped => false,
            CloseReason::ServerClosed {
                allow_reconnect, ..
            } => *allow_reconnect,
            CloseReason::TransportClosed
            | CloseReason::ServerTimeout
            | CloseReason::TransportError(_) => true,
        }
    }
}

/// Delays between automatic reconnect attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before attempt `n` (1-based) is `delays[n - 1]`. Reconnection
    /// gives up after the last entry. Empty disables reconnection.
    pub delays: Vec<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delays: DEFAULT_RECONNECT_DELAYS.to_vec(),
        }
    }
}

impl ReconnectPolicy {
    /// Policy that never reconnects.
    pub fn disabled() -> Self {
        Self { delays: Vec::new() }
    }

    /// Delay before the given attempt (1-based), or `None` to give up.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        let index = usize::try_from(attempt.checked_sub(1)?).ok()?;
        self.delays.get(index).copied()
    }
}

/// Transport settings of a hub connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Connection is considered dead when nothing arrives for this long.
    pub server_timeout: Duration,
    /// Interval between client pings.
    pub keep_alive_interval: Duration,
    /// Time allowed for the handshake answer.
    pub handshake_timeout: Duration,
    /// Automatic reconnection schedule.
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            server_timeout: SERVER_TIMEOUT,
            keep_alive_interval: KEEP_ALIVE_INTERVAL,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Lifecycle of a [`RealtimeClient`](crate::RealtimeClient). Forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientPhase {
    NotStarted = 0,
    Started = 1,
    Disposed = 2,
}

impl ClientPhase {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientPhase::NotStarted,
            1 => ClientPhase::Started,
            _ => ClientPhase::Disposed,
        }
    }
}
