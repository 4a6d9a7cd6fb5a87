use thiserror::Error;

/// Errors raised while framing or decoding controller messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("frame length {0} is smaller than the header")]
    FrameTooShort(u32),

    #[error("frame length {len} exceeds the maximum of {max}")]
    FrameTooLong { len: u32, max: u32 },

    #[error("unknown message type {0}")]
    UnknownType(u32),

    #[error("{kind} body too short: need {need} bytes, got {got}")]
    Truncated {
        kind: &'static str,
        need: usize,
        got: usize,
    },

    #[error("malformed {kind}: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, ProtoError>;
