//! Point queries: fetch one entity by fingerprint from a remote.
//!
//! Used to resolve a missing parent (a post whose thread is unknown, a
//! board owner key never seen). The walk is index, then caches whose time
//! range could contain the entity, then the cache's manifest used as a
//! fingerprint index for a direct page jump, falling back to a linear page
//! scan when the cache carries no manifest. The first in-range cache that
//! holds the fingerprint wins; later overlapping caches are not consulted.

use agora_types::{Entity, EntityKind, Fingerprint, Timestamp};
use agora_wire::ApiResponse;
use tracing::debug;

use crate::error::SyncResult;
use crate::fetch::FetchClient;
use crate::inventory::LocalInventory;
use crate::transport::RemoteTransport;

impl<T: RemoteTransport, I: LocalInventory> FetchClient<T, I> {
    /// Look one entity up on the remote.
    ///
    /// The creation and last-update hints narrow the cache set to ranges
    /// containing either instant; with no hints every cache is scanned. The
    /// last-update hint is meaningless for immutable kinds and ignored for
    /// them. Returns `Ok(None)` when the remote does not hold the entity;
    /// a gate rejection of the found entity is an error, not a miss.
    pub async fn query_by_fingerprint(
        &self,
        kind: EntityKind,
        fingerprint: &Fingerprint,
        known_creation: Option<Timestamp>,
        known_last_update: Option<Timestamp>,
    ) -> SyncResult<Option<Entity>> {
        let index = self.transport().get_index(kind).await?;
        let update_hint = if kind.is_updateable() {
            known_last_update
        } else {
            None
        };

        for cache in &index.results {
            let in_range = match (known_creation, update_hint) {
                (None, None) => true,
                (creation, update) => {
                    creation.is_some_and(|at| cache.contains(at))
                        || update.is_some_and(|at| cache.contains(at))
                }
            };
            if !in_range {
                continue;
            }

            match self.manifest_entries(kind, cache).await {
                Ok(entries) if !entries.is_empty() => {
                    let Some(entry) = entries.iter().find(|e| &e.fingerprint == fingerprint)
                    else {
                        continue;
                    };
                    let response = self.transport().get_page(kind, cache, entry.page).await?;
                    if let Some(entity) = find_in_page(response, fingerprint) {
                        self.gate().verify(&entity)?;
                        return Ok(Some(entity));
                    }
                    debug!(
                        cache = cache.response_url,
                        page = entry.page,
                        "manifest pointed at a page not holding the entity"
                    );
                }
                _ => {
                    let first = self.transport().get_page(kind, cache, 0).await?;
                    let pages = first.pagination.pages.max(1);
                    if let Some(entity) = find_in_page(first, fingerprint) {
                        self.gate().verify(&entity)?;
                        return Ok(Some(entity));
                    }
                    for page in 1..pages {
                        let response = self.transport().get_page(kind, cache, page).await?;
                        if let Some(entity) = find_in_page(response, fingerprint) {
                            self.gate().verify(&entity)?;
                            return Ok(Some(entity));
                        }
                    }
                }
            }
        }
        Ok(None)
    }
}

fn find_in_page(response: ApiResponse, fingerprint: &Fingerprint) -> Option<Entity> {
    response
        .response
        .into_entities()
        .into_iter()
        .find(|entity| entity.fingerprint() == Some(fingerprint))
}
