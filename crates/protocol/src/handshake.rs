//! Hub protocol handshake.
//!
//! The client opens with `{"protocol":"json","version":1}` and the server
//! answers with an empty object or an object carrying `error`. Records that
//! follow the answer in the same message are ordinary frames.

use serde::{Deserialize, Serialize};

use crate::constants::{PROTOCOL_NAME, PROTOCOL_VERSION, RECORD_SEPARATOR};
use crate::error::ProtocolError;
use crate::framing::write_record;

/// First record sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeRequest {
    pub protocol: String,
    pub version: u32,
}

impl HandshakeRequest {
    /// Handshake request for the JSON protocol.
    pub fn json() -> Self {
        Self {
            protocol: PROTOCOL_NAME.into(),
            version: PROTOCOL_VERSION,
        }
    }

    /// Encodes the request as a terminated record.
    pub fn to_record(&self) -> Result<String, ProtocolError> {
        Ok(write_record(&serde_json::to_string(self)?))
    }
}

/// Server answer to [`HandshakeRequest`].
///
/// Unknown fields such as `minorVersion` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HandshakeResponse {
    #[serde(default)]
    pub error: Option<String>,
}

/// Parses the handshake answer from the start of `buffer`.
///
/// Returns `Ok(None)` while the terminator has not arrived yet, otherwise
/// the response and whatever text follows it.
pub fn parse_handshake_response(
    buffer: &str,
) -> Result<Option<(HandshakeResponse, &str)>, ProtocolError> {
    let Some(end) = buffer.find(RECORD_SEPARATOR) else {
        return Ok(None);
    };
    let response: HandshakeResponse = serde_json::from_str(&buffer[..end])?;
    let rest = &buffer[end + RECORD_SEPARATOR.len_utf8()..];
    Ok(Some((response, rest)))
}
