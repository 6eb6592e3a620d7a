//! What the fetch client knows about local holdings.

use tracing::warn;

use agora_store::MergeStore;
use agora_types::{EntityKind, Fingerprint, Timestamp};

/// Download-avoidance probe: does a local copy exist that is at least as new
/// as the advertised `last_update`?
///
/// A `true` lets the walk skip the page carrying the entity; a `false` only
/// costs a redundant download, so implementations should answer `false`
/// whenever unsure.
pub trait LocalInventory: Send + Sync {
    fn is_current(&self, kind: EntityKind, fingerprint: &Fingerprint, last_update: Timestamp)
        -> bool;
}

impl LocalInventory for MergeStore {
    fn is_current(
        &self,
        kind: EntityKind,
        fingerprint: &Fingerprint,
        last_update: Timestamp,
    ) -> bool {
        match MergeStore::is_current(self, kind, fingerprint, last_update) {
            Ok(current) => current,
            Err(err) => {
                warn!(%err, "inventory probe failed, treating entity as stale");
                false
            }
        }
    }
}

/// Knows nothing; every manifest entry reads as stale. Bootstrap walks and
/// tests use this.
pub struct EmptyInventory;

impl LocalInventory for EmptyInventory {
    fn is_current(&self, _: EntityKind, _: &Fingerprint, _: Timestamp) -> bool {
        false
    }
}
