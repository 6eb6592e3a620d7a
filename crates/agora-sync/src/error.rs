use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

/// Fetch-client failures.
///
/// Per-page transport and decode failures inside a walk are absorbed into
/// the broken-page counter rather than surfaced here; these variants are for
/// failures the caller must see (a point query that cannot reach the remote,
/// an entity rejected by the gate on a direct lookup).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport: {0}")]
    Transport(String),

    #[error(transparent)]
    Wire(#[from] agora_wire::WireError),

    #[error("entity rejected by gate: {0}")]
    Rejected(#[from] agora_gate::GateError),

    #[error("invalid sync config: {0}")]
    Config(String),
}
