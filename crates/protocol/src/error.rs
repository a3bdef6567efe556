use crate::envelope::FrameKind;

/// Errors decoding or encoding hub protocol records.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record is missing its terminator")]
    IncompleteRecord,

    #[error("frame has no `type` field")]
    MissingType,

    #[error("unknown frame type {0}")]
    UnknownType(u64),

    #[error("frame type {0:?} cannot be encoded by this client")]
    Unencodable(FrameKind),
}
