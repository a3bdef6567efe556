use std::fmt;
use std::time::Duration;

/// Terminates every record of the JSON hub protocol.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Path of the realtime hub, appended to the service base address.
pub const HUB_PATH: &str = "/signalRHub";

/// Hub protocol name sent in the handshake.
pub const PROTOCOL_NAME: &str = "json";

/// Hub protocol version sent in the handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// If nothing arrives from the server within this window the connection
/// is considered dead.
pub const SERVER_TIMEOUT: Duration = Duration::from_secs(30);

/// How often the client sends a hub ping (must be well below the server's
/// client timeout of 30s).
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Time allowed for the server to answer the handshake request.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Delays before each automatic reconnect attempt. Reconnection stops
/// after the last entry.
pub const DEFAULT_RECONNECT_DELAYS: [Duration; 4] = [
    Duration::from_secs(0),
    Duration::from_secs(2),
    Duration::from_secs(10),
    Duration::from_secs(30),
];

/// Hub method names exchanged with the server.
///
/// The wire name of each variant is fixed; see [`HubMethod::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubMethod {
    // Server to client
    Connect,
    Disconnect,
    Start,
    Completed,
    // Both directions
    SendNotification,
    SendMessage,
    // Server to client
    SendPrivateMessage,
}

impl HubMethod {
    /// Every method the server may invoke on the client.
    pub const INBOUND: [HubMethod; 7] = [
        HubMethod::Connect,
        HubMethod::Disconnect,
        HubMethod::Start,
        HubMethod::Completed,
        HubMethod::SendNotification,
        HubMethod::SendMessage,
        HubMethod::SendPrivateMessage,
    ];

    /// Wire name of the method.
    pub const fn as_str(self) -> &'static str {
        match self {
            HubMethod::Connect => "Connect",
            HubMethod::Disconnect => "Disconnect",
            HubMethod::Start => "Start",
            HubMethod::Completed => "Completed",
            HubMethod::SendNotification => "SendNotification",
            HubMethod::SendMessage => "SendMessage",
            HubMethod::SendPrivateMessage => "SendPrivateMessage",
        }
    }

    /// Number of string arguments the server sends with this method.
    pub const fn inbound_arity(self) -> usize {
        match self {
            HubMethod::Start | HubMethod::Completed | HubMethod::SendNotification => 1,
            HubMethod::Connect | HubMethod::Disconnect | HubMethod::SendMessage => 2,
            HubMethod::SendPrivateMessage => 3,
        }
    }

    /// Looks up a method by its wire name (case-sensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::INBOUND.into_iter().find(|m| m.as_str() == name)
    }
}

impl fmt::Display for HubMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
