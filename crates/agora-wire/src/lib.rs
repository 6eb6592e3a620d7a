//! Wire protocol containers for Agora replication.
//!
//! Every HTTP payload in the pull protocol is one JSON [`ApiResponse`]
//! envelope: endpoint indexes, cache pages, manifests, and delta responses
//! all share it, differing only in which parts are populated. This crate is
//! pure data plus size-guarded decoding; transport lives in `agora-sync`.

pub mod delta;
pub mod envelope;
pub mod error;
pub mod manifest;

pub use delta::{DeltaRequest, TimeFilter};
pub use envelope::{
    decode_response, signable_bytes, ApiResponse, CacheLink, Caching, EntityCount, Pagination,
    ResponseBody,
};
pub use error::{WireError, WireResult};
pub use manifest::ManifestEntry;
