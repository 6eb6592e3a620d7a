//! In-process transport mock and payload builders shared by the walk and
//! query tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use agora_types::{Address, Board, EntityKind, Fingerprint, Thread, Timestamp};
use agora_wire::{
    ApiResponse, CacheLink, DeltaRequest, ManifestEntry, Pagination, ResponseBody,
};

use crate::error::{SyncError, SyncResult};
use crate::inventory::LocalInventory;
use crate::transport::RemoteTransport;

type Stored = Result<ApiResponse, String>;

/// Scripted remote: responses are registered up front, every request is
/// recorded.
#[derive(Default)]
pub struct MockTransport {
    indexes: HashMap<EntityKind, Stored>,
    pages: HashMap<(EntityKind, String, u32), Stored>,
    manifests: HashMap<(EntityKind, String, u32), Stored>,
    deltas: HashMap<EntityKind, Stored>,
    hits: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn put_index(&mut self, kind: EntityKind, response: ApiResponse) {
        self.indexes.insert(kind, Ok(response));
    }

    pub fn put_page(&mut self, kind: EntityKind, cache: &str, page: u32, response: ApiResponse) {
        self.pages.insert((kind, cache.to_string(), page), Ok(response));
    }

    pub fn put_page_err(&mut self, kind: EntityKind, cache: &str, page: u32, msg: &str) {
        self.pages
            .insert((kind, cache.to_string(), page), Err(msg.to_string()));
    }

    pub fn put_manifest(
        &mut self,
        kind: EntityKind,
        cache: &str,
        page: u32,
        response: ApiResponse,
    ) {
        self.manifests
            .insert((kind, cache.to_string(), page), Ok(response));
    }

    pub fn put_manifest_err(&mut self, kind: EntityKind, cache: &str, page: u32, msg: &str) {
        self.manifests
            .insert((kind, cache.to_string(), page), Err(msg.to_string()));
    }

    pub fn put_delta(&mut self, kind: EntityKind, response: ApiResponse) {
        self.deltas.insert(kind, Ok(response));
    }

    /// Every request made so far, in order, as `what/endpoint[/cache/page]`.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().expect("lock poisoned").clone()
    }

    fn record(&self, hit: String) {
        self.hits.lock().expect("lock poisoned").push(hit);
    }

    fn stored(entry: Option<&Stored>, what: &str) -> SyncResult<ApiResponse> {
        match entry {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(msg)) => Err(SyncError::Transport(msg.clone())),
            None => Err(SyncError::Transport(format!("{what}: not scripted"))),
        }
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn get_index(&self, kind: EntityKind) -> SyncResult<ApiResponse> {
        self.record(format!("index/{kind}"));
        Self::stored(self.indexes.get(&kind), "index")
    }

    async fn get_page(
        &self,
        kind: EntityKind,
        cache: &CacheLink,
        page: u32,
    ) -> SyncResult<ApiResponse> {
        self.record(format!("page/{kind}/{}/{page}", cache.response_url));
        Self::stored(
            self.pages.get(&(kind, cache.response_url.clone(), page)),
            "page",
        )
    }

    async fn get_manifest(
        &self,
        kind: EntityKind,
        cache: &CacheLink,
        page: u32,
    ) -> SyncResult<ApiResponse> {
        self.record(format!("manifest/{kind}/{}/{page}", cache.response_url));
        Self::stored(
            self.manifests.get(&(kind, cache.response_url.clone(), page)),
            "manifest",
        )
    }

    async fn post_delta(
        &self,
        kind: EntityKind,
        _request: &DeltaRequest,
    ) -> SyncResult<ApiResponse> {
        self.record(format!("delta/{kind}"));
        Self::stored(self.deltas.get(&kind), "delta")
    }
}

/// Inventory holding a fixed fingerprint -> newest-stamp map.
pub struct SetInventory(HashMap<String, i64>);

impl SetInventory {
    pub fn holding(entries: &[(&str, i64)]) -> Self {
        Self(
            entries
                .iter()
                .map(|(fp, stamp)| (fp.to_string(), *stamp))
                .collect(),
        )
    }
}

impl LocalInventory for SetInventory {
    fn is_current(
        &self,
        _kind: EntityKind,
        fingerprint: &Fingerprint,
        last_update: Timestamp,
    ) -> bool {
        self.0
            .get(fingerprint.as_str())
            .is_some_and(|stamp| *stamp >= last_update.as_secs())
    }
}

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

pub fn link(url: &str, starts_from: i64, ends_at: i64) -> CacheLink {
    CacheLink {
        response_url: url.to_string(),
        starts_from: Timestamp::new(starts_from),
        ends_at: Timestamp::new(ends_at),
    }
}

pub fn index_of(links: Vec<CacheLink>) -> ApiResponse {
    ApiResponse {
        results: links,
        ..Default::default()
    }
}

pub fn page_with(body: ResponseBody, pages: u32, current_page: u32) -> ApiResponse {
    ApiResponse {
        pagination: Pagination {
            pages,
            current_page,
        },
        response: body,
        ..Default::default()
    }
}

pub fn thread_named(fp: &str) -> Thread {
    Thread {
        fingerprint: Fingerprint::new(fp),
        board: Fingerprint::new("board-1"),
        name: format!("thread {fp}"),
        body: "text".into(),
        owner: Fingerprint::new("key-1"),
        creation: Timestamp::new(100),
        ..Default::default()
    }
}

pub fn board_named(fp: &str) -> Board {
    Board {
        fingerprint: Fingerprint::new(fp),
        name: format!("board {fp}"),
        owner: Fingerprint::new("key-1"),
        creation: Timestamp::new(100),
        ..Default::default()
    }
}

pub fn thread_page(fps: &[&str], pages: u32, current_page: u32) -> ApiResponse {
    let body = ResponseBody {
        threads: fps.iter().map(|fp| thread_named(fp)).collect(),
        ..Default::default()
    };
    page_with(body, pages, current_page)
}

pub fn address_page(ports: std::ops::Range<u16>, pages: u32, current_page: u32) -> ApiResponse {
    let body = ResponseBody {
        addresses: ports
            .map(|n| Address {
                location: format!("peer-{n}.example"),
                port: 49000 + n,
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    page_with(body, pages, current_page)
}

pub fn mentry(fp: &str, last_update: i64, page: u32) -> ManifestEntry {
    ManifestEntry {
        fingerprint: Fingerprint::new(fp),
        last_update: Timestamp::new(last_update),
        page,
    }
}

pub fn manifest_of(entries: Vec<ManifestEntry>, pages: u32) -> ApiResponse {
    let body = ResponseBody {
        manifests: entries,
        ..Default::default()
    };
    page_with(body, pages, 0)
}
