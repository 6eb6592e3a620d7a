use thiserror::Error;

/// Errors from wire envelope encoding and decoding.
#[derive(Debug, Error)]
pub enum WireError {
    /// Payload exceeded the absolute inbound byte ceiling.
    #[error("response too large: {size} bytes (ceiling {max})")]
    ResponseTooLarge { size: usize, max: usize },

    /// Malformed JSON payload. Treated as a transport failure upstream.
    #[error("decode error: {0}")]
    Decode(String),

    /// Serialization failure while building an outbound payload.
    #[error("encode error: {0}")]
    Encode(String),
}

/// Result alias for wire operations.
pub type WireResult<T> = Result<T, WireError>;
