//! Realtime hub client.
//!
//! Connects to the `/signalRHub` endpoint of a service over WebSocket,
//! forwards the inbound hub methods to local event subscribers and sends
//! `SendMessage` / `SendNotification` invocations to the server.

pub mod client;
pub(crate) mod connection;
pub mod cookies;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod events;
pub(crate) mod pumps;
pub(crate) mod reconnection;
pub mod types;

pub use client::RealtimeClient;
pub use cookies::{Cookie, CookieJar, CookieSource};
pub use dispatch::{DispatchError, DispatchTable};
pub use endpoint::{Endpoint, Navigation};
pub use error::HubError;
pub use events::{HubEvents, MessageReceived, Subscribers, SubscriptionId, UserStateChange};
pub use types::{ClientPhase, CloseReason, ConnectionConfig, ConnectionState, ReconnectPolicy};

pub use tokio_util::sync::CancellationToken;
