//! The endpoint walk: index, caches, manifest-gated pages, delta POST.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use agora_gate::EntityVerifier;
use agora_types::{Address, Entity, EntityKind, Timestamp};
use agora_wire::{ApiResponse, CacheLink, DeltaRequest, ManifestEntry};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::inventory::LocalInventory;
use crate::transport::RemoteTransport;

/// What one endpoint walk brought home.
///
/// Entities here have passed the gate; they are ready for
/// `MergeStore::batch_merge`, which applies its own identity and LWW rules.
#[derive(Debug, Default)]
pub struct ReplicaDelta {
    pub entities: Vec<Entity>,
    pub pages_fetched: u32,
    pub pages_skipped: u32,
    pub dropped_entities: u32,
    /// The walk hit the broken-page ceiling and stopped early.
    pub aborted: bool,
}

#[derive(PartialEq, Eq)]
enum WalkControl {
    Continue,
    Stop,
}

enum PageOutcome {
    Accepted,
    /// Too many gate rejections; the page counts as broken and nothing on
    /// it is kept.
    Escalated,
    /// The address cap was reached; the endpoint walk ends here.
    Capped,
}

/// Pull-replication client for one remote node.
///
/// All requests to a given remote run strictly sequentially; concurrency in
/// a deployment comes from running one client per remote.
pub struct FetchClient<T, I> {
    transport: T,
    inventory: I,
    gate: Arc<dyn EntityVerifier>,
    config: SyncConfig,
    /// This node's self-description, gossiped inside delta requests.
    caller: Address,
}

impl<T: RemoteTransport, I: LocalInventory> FetchClient<T, I> {
    pub fn new(transport: T, inventory: I, gate: Arc<dyn EntityVerifier>, config: SyncConfig) -> Self {
        Self {
            transport,
            inventory,
            gate,
            config,
            caller: Address::default(),
        }
    }

    pub fn with_caller(mut self, caller: Address) -> Self {
        self.caller = caller;
        self
    }

    /// Walk every endpoint of the remote. Endpoints fail independently; a
    /// remote with a broken truststate endpoint still delivers its boards.
    pub async fn fetch_all(&self, last_checkin: Timestamp) -> Vec<(EntityKind, ReplicaDelta)> {
        let mut out = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let delta = match self.fetch_remote_delta(kind, last_checkin).await {
                Ok(delta) => delta,
                Err(err) => {
                    warn!(kind = %kind, %err, "endpoint walk failed");
                    ReplicaDelta {
                        aborted: true,
                        ..Default::default()
                    }
                }
            };
            info!(
                kind = %kind,
                entities = delta.entities.len(),
                fetched = delta.pages_fetched,
                skipped = delta.pages_skipped,
                dropped = delta.dropped_entities,
                aborted = delta.aborted,
                "endpoint walk done"
            );
            out.push((kind, delta));
        }
        out
    }

    /// Fetch everything newer than `last_checkin` from one endpoint.
    ///
    /// A zero check-in is a bootstrap: the full cache walk, index down to
    /// pages. Otherwise a delta request is POSTed and any overflow cache
    /// links in its response are walked the same way.
    pub async fn fetch_remote_delta(
        &self,
        kind: EntityKind,
        last_checkin: Timestamp,
    ) -> SyncResult<ReplicaDelta> {
        let mut delta = ReplicaDelta::default();
        let mut broken = 0u32;

        if last_checkin.is_zero() {
            let index = self.transport.get_index(kind).await?;
            for cache in &index.results {
                if !cache.overlaps_since(last_checkin) {
                    continue;
                }
                if self.fetch_cache(kind, cache, &mut delta, &mut broken).await
                    == WalkControl::Stop
                {
                    break;
                }
            }
        } else {
            let request = DeltaRequest::since(last_checkin, self.caller.clone());
            match self.transport.post_delta(kind, &request).await {
                Ok(response) => {
                    let overflow: Vec<CacheLink> = response.results.clone();
                    match self.ingest_page(kind, response, &mut delta) {
                        PageOutcome::Accepted => {}
                        PageOutcome::Escalated => {
                            if self.note_broken(&mut broken, &mut delta) == WalkControl::Stop {
                                return Ok(delta);
                            }
                        }
                        PageOutcome::Capped => return Ok(delta),
                    }
                    for cache in &overflow {
                        if !cache.overlaps_since(last_checkin) {
                            continue;
                        }
                        if self.fetch_cache(kind, cache, &mut delta, &mut broken).await
                            == WalkControl::Stop
                        {
                            break;
                        }
                    }
                }
                Err(err) => {
                    warn!(kind = %kind, %err, "delta request failed");
                    delta.aborted = true;
                }
            }
        }
        Ok(delta)
    }

    async fn fetch_cache(
        &self,
        kind: EntityKind,
        cache: &CacheLink,
        delta: &mut ReplicaDelta,
        broken: &mut u32,
    ) -> WalkControl {
        // Page 0 carries the authoritative page count; it is fetched even
        // when the manifest later gates it out.
        let first = match self.transport.get_page(kind, cache, 0).await {
            Ok(response) => response,
            Err(err) => {
                warn!(kind = %kind, cache = cache.response_url, %err, "cache page 0 broken");
                return self.note_broken(broken, delta);
            }
        };
        let pages = first.pagination.pages.max(1);
        let hitlist = self.page_hitlist(kind, cache).await;

        if hitlist.as_ref().map_or(true, |hits| hits.contains(&0)) {
            match self.ingest_page(kind, first, delta) {
                PageOutcome::Accepted => {}
                PageOutcome::Escalated => {
                    if self.note_broken(broken, delta) == WalkControl::Stop {
                        return WalkControl::Stop;
                    }
                }
                PageOutcome::Capped => return WalkControl::Stop,
            }
        } else {
            delta.pages_skipped += 1;
        }

        for page in 1..pages {
            if let Some(hits) = &hitlist {
                if !hits.contains(&page) {
                    delta.pages_skipped += 1;
                    continue;
                }
            }
            match self.transport.get_page(kind, cache, page).await {
                Ok(response) => match self.ingest_page(kind, response, delta) {
                    PageOutcome::Accepted => {}
                    PageOutcome::Escalated => {
                        if self.note_broken(broken, delta) == WalkControl::Stop {
                            return WalkControl::Stop;
                        }
                    }
                    PageOutcome::Capped => return WalkControl::Stop,
                },
                Err(err) => {
                    warn!(kind = %kind, cache = cache.response_url, page, %err, "page broken");
                    if self.note_broken(broken, delta) == WalkControl::Stop {
                        return WalkControl::Stop;
                    }
                }
            }
        }
        WalkControl::Continue
    }

    /// Which pages of a cache still hold something worth downloading,
    /// according to its manifest. `None` means no usable manifest: fetch
    /// every page. The manifest is advisory, so its failure is never a
    /// broken page.
    async fn page_hitlist(&self, kind: EntityKind, cache: &CacheLink) -> Option<BTreeSet<u32>> {
        if kind == EntityKind::Address {
            return None;
        }
        let entries = match self.manifest_entries(kind, cache).await {
            Ok(entries) if !entries.is_empty() => entries,
            Ok(_) => return None,
            Err(err) => {
                debug!(kind = %kind, cache = cache.response_url, %err,
                       "manifest unavailable, fetching every page");
                return None;
            }
        };
        let mut hits = BTreeSet::new();
        for entry in &entries {
            if !self
                .inventory
                .is_current(kind, &entry.fingerprint, entry.last_update)
            {
                hits.insert(entry.page);
            }
        }
        Some(hits)
    }

    pub(crate) async fn manifest_entries(
        &self,
        kind: EntityKind,
        cache: &CacheLink,
    ) -> SyncResult<Vec<ManifestEntry>> {
        let first = self.transport.get_manifest(kind, cache, 0).await?;
        let pages = first.pagination.pages.max(1);
        let mut entries = first.response.manifests;
        for page in 1..pages {
            let next = self.transport.get_manifest(kind, cache, page).await?;
            entries.extend(next.response.manifests);
        }
        Ok(entries)
    }

    fn ingest_page(
        &self,
        kind: EntityKind,
        response: ApiResponse,
        delta: &mut ReplicaDelta,
    ) -> PageOutcome {
        delta.pages_fetched += 1;
        let mut accepted = Vec::new();
        let mut bad = 0u32;
        for entity in response.response.into_entities() {
            match self.gate.verify(&entity) {
                Ok(()) => accepted.push(entity),
                Err(err) => {
                    debug!(kind = %kind, %err, "entity dropped by gate");
                    bad += 1;
                }
            }
        }
        delta.dropped_entities += bad;
        if bad >= self.config.max_bad_entities_per_page {
            warn!(kind = %kind, bad, "page discarded after repeated gate rejections");
            return PageOutcome::Escalated;
        }
        delta.entities.extend(accepted);

        if kind == EntityKind::Address {
            let mut seen = 0usize;
            let cap = self.config.address_cap;
            delta.entities.retain(|entity| {
                if entity.kind() == EntityKind::Address {
                    seen += 1;
                    seen <= cap
                } else {
                    true
                }
            });
            if seen >= cap {
                debug!(cap, "address cap reached, ending endpoint walk");
                return PageOutcome::Capped;
            }
        }
        PageOutcome::Accepted
    }

    fn note_broken(&self, broken: &mut u32, delta: &mut ReplicaDelta) -> WalkControl {
        *broken += 1;
        if *broken >= self.config.max_broken_pages {
            delta.aborted = true;
            WalkControl::Stop
        } else {
            WalkControl::Continue
        }
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn gate(&self) -> &dyn EntityVerifier {
        self.gate.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::EmptyInventory;
    use crate::testutil::*;
    use agora_gate::{FieldBoundsGate, GateConfig, PermissiveGate};
    use agora_types::Board;

    fn client(transport: MockTransport) -> FetchClient<MockTransport, EmptyInventory> {
        FetchClient::new(
            transport,
            EmptyInventory,
            Arc::new(PermissiveGate),
            SyncConfig::default(),
        )
    }

    #[tokio::test]
    async fn bootstrap_walks_index_caches_and_pages() {
        let mut mock = MockTransport::default();
        mock.put_index(
            EntityKind::Thread,
            index_of(vec![link("cache_0", 0, 100), link("cache_1", 100, 200)]),
        );
        mock.put_page(EntityKind::Thread, "cache_0", 0, thread_page(&["t1"], 2, 0));
        mock.put_page(EntityKind::Thread, "cache_0", 1, thread_page(&["t2"], 2, 1));
        mock.put_page(EntityKind::Thread, "cache_1", 0, thread_page(&["t3"], 1, 0));

        let delta = client(mock)
            .fetch_remote_delta(EntityKind::Thread, Timestamp::zero())
            .await
            .unwrap();
        assert_eq!(delta.entities.len(), 3);
        assert_eq!(delta.pages_fetched, 3);
        assert!(!delta.aborted);
    }

    #[tokio::test]
    async fn manifest_gating_skips_pages_with_only_current_entities() {
        let mut mock = MockTransport::default();
        mock.put_index(EntityKind::Thread, index_of(vec![link("cache_0", 0, 100)]));
        mock.put_page(EntityKind::Thread, "cache_0", 0, thread_page(&["t1"], 3, 0));
        mock.put_page(EntityKind::Thread, "cache_0", 1, thread_page(&["t2"], 3, 1));
        mock.put_page(EntityKind::Thread, "cache_0", 2, thread_page(&["t3"], 3, 2));
        mock.put_manifest(
            EntityKind::Thread,
            "cache_0",
            0,
            manifest_of(
                vec![mentry("t1", 0, 0), mentry("t2", 0, 1), mentry("t3", 0, 2)],
                1,
            ),
        );

        // t1 and t3 are already held locally.
        let inventory = SetInventory::holding(&[("t1", 50), ("t3", 50)]);
        let client = FetchClient::new(
            mock,
            inventory,
            Arc::new(PermissiveGate) as Arc<dyn EntityVerifier>,
            SyncConfig::default(),
        );
        let delta = client
            .fetch_remote_delta(EntityKind::Thread, Timestamp::zero())
            .await
            .unwrap();

        assert_eq!(delta.entities.len(), 1);
        assert_eq!(delta.entities[0].fingerprint().unwrap().as_str(), "t2");
        assert_eq!(delta.pages_fetched, 1);
        assert_eq!(delta.pages_skipped, 2);
    }

    #[tokio::test]
    async fn three_broken_pages_abort_the_endpoint() {
        let mut mock = MockTransport::default();
        mock.put_index(EntityKind::Post, index_of(vec![link("cache_0", 0, 100)]));
        mock.put_page(EntityKind::Post, "cache_0", 0, thread_page(&[], 5, 0));
        mock.put_page_err(EntityKind::Post, "cache_0", 1, "connection reset");
        mock.put_page_err(EntityKind::Post, "cache_0", 2, "connection reset");
        mock.put_page_err(EntityKind::Post, "cache_0", 3, "connection reset");
        mock.put_page(EntityKind::Post, "cache_0", 4, thread_page(&[], 5, 4));

        let client = client(mock);
        let delta = client
            .fetch_remote_delta(EntityKind::Post, Timestamp::zero())
            .await
            .unwrap();
        assert!(delta.aborted);
        // The walk stopped at the third failure; page 4 was never requested.
        assert!(!client
            .transport()
            .hits()
            .contains(&"page/posts/cache_0/4".to_string()));
    }

    #[tokio::test]
    async fn fetch_all_isolates_endpoint_failures() {
        let mut mock = MockTransport::default();
        for kind in EntityKind::ALL {
            if kind != EntityKind::Vote {
                mock.put_index(kind, index_of(vec![]));
            }
        }
        // Votes: no index at all, the endpoint fails outright.
        let client = client(mock);
        let deltas = client.fetch_all(Timestamp::zero()).await;

        assert_eq!(deltas.len(), 7);
        for (kind, delta) in &deltas {
            if *kind == EntityKind::Vote {
                assert!(delta.aborted);
            } else {
                assert!(!delta.aborted);
            }
        }
    }

    #[tokio::test]
    async fn repeated_gate_rejections_discard_the_page() {
        let mut mock = MockTransport::default();
        mock.put_index(EntityKind::Board, index_of(vec![link("cache_0", 0, 100)]));
        // Three boards with empty identity plus one good one on the same
        // page: the page escalates and even the good board is dropped.
        let mut body = agora_wire::ResponseBody::default();
        body.boards = vec![
            Board::default(),
            Board::default(),
            Board::default(),
            board_named("b-good"),
        ];
        mock.put_page(EntityKind::Board, "cache_0", 0, page_with(body, 1, 0));

        let client = FetchClient::new(
            mock,
            EmptyInventory,
            Arc::new(FieldBoundsGate::new(GateConfig::default())) as Arc<dyn EntityVerifier>,
            SyncConfig::default(),
        );
        let delta = client
            .fetch_remote_delta(EntityKind::Board, Timestamp::zero())
            .await
            .unwrap();
        assert!(delta.entities.is_empty());
        assert_eq!(delta.dropped_entities, 3);
        // One escalated page is not yet an endpoint abort.
        assert!(!delta.aborted);
    }

    #[tokio::test]
    async fn address_walk_stops_at_the_cap() {
        let mut config = SyncConfig::default();
        config.address_cap = 5;

        let mut mock = MockTransport::default();
        mock.put_index(EntityKind::Address, index_of(vec![link("cache_0", 0, 100)]));
        mock.put_page(
            EntityKind::Address,
            "cache_0",
            0,
            address_page(0..4, 3, 0),
        );
        mock.put_page(
            EntityKind::Address,
            "cache_0",
            1,
            address_page(4..8, 3, 1),
        );
        mock.put_page(
            EntityKind::Address,
            "cache_0",
            2,
            address_page(8..12, 3, 2),
        );

        let client = FetchClient::new(
            mock,
            EmptyInventory,
            Arc::new(PermissiveGate) as Arc<dyn EntityVerifier>,
            config,
        );
        let delta = client
            .fetch_remote_delta(EntityKind::Address, Timestamp::zero())
            .await
            .unwrap();
        assert_eq!(delta.entities.len(), 5);
        assert!(!delta.aborted);
        // Page 2 was never requested.
        assert!(!client
            .transport()
            .hits()
            .contains(&"page/addresses/cache_0/2".to_string()));
    }

    #[tokio::test]
    async fn incremental_fetch_posts_delta_and_follows_overflow() {
        let mut mock = MockTransport::default();
        let mut response = thread_page(&["t-new"], 1, 0);
        response.results = vec![link("overflow_0", 500, 900)];
        mock.put_delta(EntityKind::Thread, response);
        mock.put_page(
            EntityKind::Thread,
            "overflow_0",
            0,
            thread_page(&["t-overflow"], 1, 0),
        );

        let delta = client(mock)
            .fetch_remote_delta(EntityKind::Thread, Timestamp::new(600))
            .await
            .unwrap();
        let fps: Vec<&str> = delta
            .entities
            .iter()
            .map(|e| e.fingerprint().unwrap().as_str())
            .collect();
        assert_eq!(fps, vec!["t-new", "t-overflow"]);
    }

    #[tokio::test]
    async fn incremental_skips_overflow_caches_older_than_checkin() {
        let mut mock = MockTransport::default();
        let mut response = thread_page(&["t-new"], 1, 0);
        response.results = vec![link("stale_0", 0, 100)];
        mock.put_delta(EntityKind::Thread, response);
        // No page registered for stale_0: fetching it would break the walk.

        let delta = client(mock)
            .fetch_remote_delta(EntityKind::Thread, Timestamp::new(600))
            .await
            .unwrap();
        assert_eq!(delta.entities.len(), 1);
        assert!(!delta.aborted);
    }

    #[tokio::test]
    async fn broken_manifest_falls_back_to_full_fetch() {
        let mut mock = MockTransport::default();
        mock.put_index(EntityKind::Thread, index_of(vec![link("cache_0", 0, 100)]));
        mock.put_page(EntityKind::Thread, "cache_0", 0, thread_page(&["t1"], 1, 0));
        mock.put_manifest_err(EntityKind::Thread, "cache_0", 0, "404");

        let delta = client(mock)
            .fetch_remote_delta(EntityKind::Thread, Timestamp::zero())
            .await
            .unwrap();
        assert_eq!(delta.entities.len(), 1);
        assert!(!delta.aborted);
    }
}
