//! Error type for the realtime client.

use hubwire_protocol::ProtocolError;
use tokio_tungstenite::tungstenite;

/// Errors from the realtime client and its connection.
///
/// [`HubError::Cancelled`] is the only cancellation error; every other
/// variant describes a failed or missing connection.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid hub url: {0}")]
    InvalidUrl(String),

    #[error("invalid cookie header: {0}")]
    InvalidCookieHeader(String),

    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("handshake timed out")]
    HandshakeTimeout,

    #[error("connection is not open")]
    NotConnected,

    #[error("connection closed")]
    Closed,

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("start cancelled")]
    Cancelled,

    #[error("client disposed")]
    Disposed,

    #[error("no handler registered for hub method {0}")]
    MissingHandler(&'static str),
}

impl HubError {
    /// Returns `true` if the error came from a fired cancellation token.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HubError::Cancelled)
    }

    /// Returns `true` for handshake, transport and not-open failures.
    pub fn is_connection_error(&self) -> bool {
        !self.is_cancellation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_error_display() {
        assert_eq!(HubError::NotConnected.to_string(), "connection is not open");
        assert_eq!(HubError::Cancelled.to_string(), "start cancelled");
        assert_eq!(
            HubError::HandshakeRejected("bad protocol".into()).to_string(),
            "handshake rejected: bad protocol"
        );
        assert_eq!(
            HubError::MissingHandler("Connect").to_string(),
            "no handler registered for hub method Connect"
        );
    }

    #[test]
    fn error_taxonomy() {
        assert!(HubError::Cancelled.is_cancellation());
        assert!(!HubError::Cancelled.is_connection_error());
        assert!(HubError::NotConnected.is_connection_error());
        assert!(HubError::HandshakeTimeout.is_connection_error());
        assert!(HubError::Disposed.is_connection_error());
    }
}
