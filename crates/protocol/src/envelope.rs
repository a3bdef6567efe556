//! Hub protocol frames.
//!
//! Every record is a JSON object whose integer `type` field selects the
//! frame kind. Only the kinds this client acts on get a typed payload;
//! streaming kinds decode as [`Frame::Unsupported`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::framing::write_record;

/// Integer `type` of a hub frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Invocation = 1,
    StreamItem = 2,
    Completion = 3,
    StreamInvocation = 4,
    CancelInvocation = 5,
    Ping = 6,
    Close = 7,
}

impl FrameKind {
    /// Maps a wire code to a frame kind.
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(FrameKind::Invocation),
            2 => Some(FrameKind::StreamItem),
            3 => Some(FrameKind::Completion),
            4 => Some(FrameKind::StreamInvocation),
            5 => Some(FrameKind::CancelInvocation),
            6 => Some(FrameKind::Ping),
            7 => Some(FrameKind::Close),
            _ => None,
        }
    }

    /// Wire code of this kind.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A call of a named hub method.
///
/// Without an `invocation_id` the call is fire-and-forget: the server never
/// answers with a completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    pub target: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
}

impl Invocation {
    /// Creates a fire-and-forget invocation with string arguments.
    pub fn non_blocking<I, S>(target: impl Into<String>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            invocation_id: None,
            target: target.into(),
            arguments: arguments
                .into_iter()
                .map(|a| Value::String(a.into()))
                .collect(),
        }
    }
}

/// Result of a blocking invocation. Decode only.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub invocation_id: String,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Sent by the server before it closes the connection. Decode only.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Close {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub allow_reconnect: bool,
}

/// A decoded hub frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Invocation(Invocation),
    Completion(Completion),
    Ping,
    Close(Close),
    /// A valid frame kind this client does not handle (streaming).
    Unsupported(FrameKind),
}

impl Frame {
    /// Returns the kind of this frame.
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Invocation(_) => FrameKind::Invocation,
            Frame::Completion(_) => FrameKind::Completion,
            Frame::Ping => FrameKind::Ping,
            Frame::Close(_) => FrameKind::Close,
            Frame::Unsupported(kind) => *kind,
        }
    }

    /// Decodes one record (without its terminator).
    pub fn from_json(record: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(record)?;
        let code = value
            .get("type")
            .and_then(Value::as_u64)
            .ok_or(ProtocolError::MissingType)?;
        let kind = FrameKind::from_code(code).ok_or(ProtocolError::UnknownType(code))?;

        let frame = match kind {
            FrameKind::Invocation => Frame::Invocation(serde_json::from_value(value)?),
            FrameKind::Completion => Frame::Completion(serde_json::from_value(value)?),
            FrameKind::Ping => Frame::Ping,
            FrameKind::Close => Frame::Close(serde_json::from_value(value)?),
            other => Frame::Unsupported(other),
        };
        Ok(frame)
    }

    /// Encodes this frame as JSON without a terminator.
    ///
    /// The client only ever sends invocations and pings; other kinds fail
    /// with [`ProtocolError::Unencodable`].
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let body = match self {
            Frame::Invocation(inv) => serde_json::to_value(inv)?,
            Frame::Ping => Value::Object(Map::new()),
            other => return Err(ProtocolError::Unencodable(other.kind())),
        };

        let mut object = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        object.insert("type".into(), Value::from(self.kind().code()));
        Ok(serde_json::to_string(&object)?)
    }

    /// Encodes this frame as a terminated record, ready for the socket.
    pub fn to_record(&self) -> Result<String, ProtocolError> {
        Ok(write_record(&self.to_json()?))
    }
}
