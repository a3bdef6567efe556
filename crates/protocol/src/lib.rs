//! Wire protocol for the hubwire realtime client.
//!
//! JSON hub protocol v1: a handshake, then JSON frames separated by a
//! record terminator.

pub mod constants;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod handshake;

// Re-export primary types for convenience.
pub use constants::HubMethod;
pub use envelope::{Close, Completion, Frame, FrameKind, Invocation};
pub use error::ProtocolError;
pub use handshake::{HandshakeRequest, HandshakeResponse, parse_handshake_response};
