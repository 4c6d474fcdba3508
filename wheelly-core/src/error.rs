//! error.rs — Controller and transport error kinds
//!
//! Errors never escape a controller entry point: the driver captures them,
//! publishes them on the error stream, and steers the state machine into
//! the close/retry path. Callers observe success as a boolean.

use wheelly_types::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("robot silent for {0} ms")]
    Timeout(u64),
    #[error("command rejected while {0}")]
    CommandRejected(&'static str),
    #[error("controller is shut down")]
    ShutdownInProgress,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("inference callback failed: {0}")]
    Inference(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of data at offset {0}")]
    UnexpectedEof(usize),
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),
    #[error("varint out of range for {kind}: {value}")]
    Overflow { kind: &'static str, value: i64 },
    #[error("invalid UTF-8 string payload")]
    InvalidUtf8,
    #[error("invalid record tag {0}")]
    InvalidTag(u8),
}
