use thiserror::Error;

use crate::textblob::BlobError;

/// Errors from merge store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure.
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Lock contention persisted past the single allowed retry. The storage
    /// layer is presumed corrupted; callers should halt, not continue.
    #[error("storage lock contention persisted after retry")]
    Contention,

    /// A read request carried a malformed time range.
    #[error("invalid time range: {0}")]
    InvalidTimeRange(String),

    /// A compressed text column failed to decompress.
    #[error(transparent)]
    Blob(#[from] BlobError),
}

impl StoreError {
    /// Whether the underlying failure is transient lock contention.
    pub fn is_contention(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
