use thiserror::Error;

/// Errors raised by the message codecs and schema validation.
///
/// These surface to the immediate caller; connection-level code treats
/// a decode failure as "log and drop the message", never as a reason to
/// tear the connection down.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("message too short: {0} bytes, need {1}")]
    TooShort(usize, usize),

    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("malformed JSON message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema violation: {0}")]
    SchemaViolation(String),
}
