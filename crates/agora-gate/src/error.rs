use thiserror::Error;

/// Rejection reasons from the verification gate.
///
/// A rejected entity is dropped and logged; it never reaches the merge
/// store. Three or more rejections on one page escalate to a page-level
/// error in the fetch client.
#[derive(Debug, Error)]
pub enum GateError {
    /// Structural bounds violation (empty identity, oversize field, ...).
    #[error("bounds violation: {0}")]
    Bounds(String),

    /// Fingerprint does not re-derive from the immutable fields.
    #[error("fingerprint mismatch for {0}")]
    FingerprintMismatch(String),

    /// Proof-of-work check failed.
    #[error("proof of work rejected: {0}")]
    ProofOfWork(String),

    /// Signature check failed.
    #[error("signature rejected: {0}")]
    Signature(String),

    /// The external verifier itself failed (not a judgement on the entity).
    #[error("verifier failure: {0}")]
    Internal(String),
}

/// Result alias for gate operations.
pub type GateResult<T> = Result<T, GateError>;
