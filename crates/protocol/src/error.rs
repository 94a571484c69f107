//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while upgrading a connection or decoding its traffic.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid frame opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("Frame payload of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: u64, max: usize },

    #[error("Malformed upgrade request")]
    MalformedRequest,

    #[error("Missing or unsupported Upgrade header")]
    MissingUpgradeHeader,

    #[error("Missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("Text payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}
