use serde::{Deserialize, Serialize};

use agora_types::{Address, Entity, Timestamp};

use crate::error::{WireError, WireResult};
use crate::manifest::ManifestEntry;

// ---------------------------------------------------------------------------
// Envelope parts
// ---------------------------------------------------------------------------

/// Page position within a multi-page result.
///
/// Page 0 of a cache carries the authoritative `pages` count; the fetch
/// client reads it there and never trusts later pages to change it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pagination {
    pub pages: u32,
    pub current_page: u32,
}

/// Per-kind entity count advertised by the remote, advisory only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityCount {
    pub name: String,
    pub count: u64,
}

/// Cache-generation metadata attached to the envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Caching {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entity_counts: Vec<EntityCount>,
}

/// Descriptor of one immutable cache: a URL fragment plus the time range of
/// the entities inside it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheLink {
    pub response_url: String,
    pub starts_from: Timestamp,
    pub ends_at: Timestamp,
}

impl CacheLink {
    /// A cache is worth fetching for replication when it may contain
    /// entities newer than the caller's last check-in.
    pub fn overlaps_since(&self, last_checkin: Timestamp) -> bool {
        self.ends_at >= last_checkin
    }

    /// The range contains the given instant.
    pub fn contains(&self, at: Timestamp) -> bool {
        self.starts_from <= at && at <= self.ends_at
    }
}

/// Per-type entity arrays, each omitted from the wire when empty.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseBody {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub boards: Vec<agora_types::Board>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub threads: Vec<agora_types::Thread>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub posts: Vec<agora_types::Post>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub votes: Vec<agora_types::Vote>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<agora_types::Key>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub truststates: Vec<agora_types::Truststate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<Address>,
    /// Manifest / fingerprint-index entries, present only on manifest and
    /// cache-index payloads.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<ManifestEntry>,
}

impl ResponseBody {
    /// Total number of entities across every array.
    pub fn entity_count(&self) -> usize {
        self.boards.len()
            + self.threads.len()
            + self.posts.len()
            + self.votes.len()
            + self.keys.len()
            + self.truststates.len()
            + self.addresses.len()
    }

    /// Flatten into the tagged union, in per-type order.
    pub fn into_entities(self) -> Vec<Entity> {
        let mut out = Vec::with_capacity(self.entity_count());
        out.extend(self.boards.into_iter().map(Entity::Board));
        out.extend(self.threads.into_iter().map(Entity::Thread));
        out.extend(self.posts.into_iter().map(Entity::Post));
        out.extend(self.votes.into_iter().map(Entity::Vote));
        out.extend(self.keys.into_iter().map(Entity::Key));
        out.extend(self.truststates.into_iter().map(Entity::Truststate));
        out.extend(self.addresses.into_iter().map(Entity::Address));
        out
    }
}

// ---------------------------------------------------------------------------
// ApiResponse
// ---------------------------------------------------------------------------

/// The JSON envelope shared by every payload in the pull protocol.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiResponse {
    pub node_public_key: String,
    /// Signature over the envelope with this field blanked.
    pub page_signature: String,
    /// The responding node's own address.
    pub address: Address,
    pub pagination: Pagination,
    pub caching: Caching,
    /// Cache-link descriptors (endpoint indexes and delta overflow).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<CacheLink>,
    pub response: ResponseBody,
}

/// The canonical byte string an envelope signature covers: the envelope
/// serialized with `page_signature` blanked. Signing and verification are
/// external; this only fixes the bytes both sides agree on.
pub fn signable_bytes(response: &ApiResponse) -> WireResult<Vec<u8>> {
    let mut blanked = response.clone();
    blanked.page_signature = String::new();
    serde_json::to_vec(&blanked).map_err(|e| WireError::Encode(e.to_string()))
}

/// Size-guarded envelope decode.
///
/// The ceiling is enforced before parsing so a hostile peer cannot make the
/// node buffer an arbitrarily large JSON document.
pub fn decode_response(bytes: &[u8], max_bytes: usize) -> WireResult<ApiResponse> {
    if bytes.len() > max_bytes {
        return Err(WireError::ResponseTooLarge {
            size: bytes.len(),
            max: max_bytes,
        });
    }
    serde_json::from_slice(bytes).map_err(|e| WireError::Decode(e.to_string()))
}
