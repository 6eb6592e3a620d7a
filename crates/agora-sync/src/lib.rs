//! Fetch client for the Agora replication node.
//!
//! Pull replication over HTTP: for each entity endpoint the client walks
//! index, caches, and pages, using cache manifests to skip pages whose
//! entities are already held locally, and POSTs delta requests on
//! incremental runs. Every fetched entity passes the verification gate
//! before it reaches the caller; endpoints fail independently so one broken
//! endpoint never blocks the rest of a remote.

pub mod config;
pub mod error;
pub mod fetch;
pub mod inventory;
pub mod query;
pub mod transport;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use fetch::{FetchClient, ReplicaDelta};
pub use inventory::{EmptyInventory, LocalInventory};
pub use transport::{HttpTransport, RemoteTransport};
