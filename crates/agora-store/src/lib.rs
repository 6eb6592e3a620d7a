//! Merge store for the Agora replication node.
//!
//! Transactional persistence over SQLite with last-writer-wins conflict
//! resolution and exact reconciliation of embedded sub-collections (board
//! moderator lists, currency addresses). The write path commits fetched or
//! locally authored entities; the read path serves fingerprint-set and
//! arrival-time-range queries with on-read embed joins.
//!
//! Writes are conditional and idempotent: a failed fetch can never corrupt
//! local state. Storage lock contention is retried exactly once and then
//! treated as fatal, surfacing corruption instead of masking it.

pub mod config;
pub mod error;
pub mod read;
pub mod schema;
pub mod store;
pub mod textblob;
pub mod write;

pub use config::{RetryPolicy, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use read::{Embed, ReadQuery, ResultSet, Selector};
pub use store::MergeStore;
pub use write::{subentity_diff, MergeReport};
