use thiserror::Error;

/// Errors from foundation type parsing and construction.
#[derive(Debug, Error)]
pub enum TypeError {
    /// An endpoint name did not match any known entity kind.
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// A fingerprint string failed structural validation.
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// A timestamp was outside the representable range.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}
