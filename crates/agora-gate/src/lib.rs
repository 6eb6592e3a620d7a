//! Verification gate seam.
//!
//! Every entity fetched from the network passes through a single
//! `verify -> ok | error` gate before the merge store will touch it. The
//! cryptographic chain itself (fingerprint recomputation, proof-of-work,
//! signatures, versioned per entity schema) is an external collaborator;
//! this crate owns the seam, a structural bounds stage, and the fail-fast
//! pipeline that composes stages.

pub mod error;
pub mod gate;

pub use error::{GateError, GateResult};
pub use gate::{EntityVerifier, FieldBoundsGate, GateConfig, GatePipeline, PermissiveGate};
