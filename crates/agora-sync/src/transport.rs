//! The remote seam: everything the fetch client asks of a peer.
//!
//! The trait exists so the walk and query logic test against an in-process
//! mock; [`HttpTransport`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use agora_types::EntityKind;
use agora_wire::{decode_response, ApiResponse, CacheLink, DeltaRequest, WireError};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// One remote node, seen through the four requests the pull protocol makes.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// GET the endpoint index: the cache-link list for one entity kind.
    async fn get_index(&self, kind: EntityKind) -> SyncResult<ApiResponse>;

    /// GET one page of one cache.
    async fn get_page(
        &self,
        kind: EntityKind,
        cache: &CacheLink,
        page: u32,
    ) -> SyncResult<ApiResponse>;

    /// GET one page of a cache's manifest.
    async fn get_manifest(
        &self,
        kind: EntityKind,
        cache: &CacheLink,
        page: u32,
    ) -> SyncResult<ApiResponse>;

    /// POST a delta request for entities newer than the caller's check-in.
    async fn post_delta(
        &self,
        kind: EntityKind,
        request: &DeltaRequest,
    ) -> SyncResult<ApiResponse>;
}

/// HTTP implementation over reqwest.
///
/// URL scheme: `{base}/{subprotocol}/v0/{endpoint}/index.json`,
/// `.../{cache}/{page}.json`, `.../{cache}/manifest/{page}.json`, and a
/// `POST` to the endpoint root for deltas. Response bodies are size-capped
/// while streaming, so a
/// hostile peer cannot balloon memory before the decode guard runs.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    subprotocol: String,
    max_response_bytes: usize,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, config: &SyncConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            subprotocol: config.subprotocol.clone(),
            max_response_bytes: config.max_response_bytes,
        })
    }

    fn endpoint_url(&self, kind: EntityKind, tail: &str) -> String {
        format!(
            "{}/{}/v0/{}/{}",
            self.base_url,
            self.subprotocol,
            kind.endpoint(),
            tail
        )
    }

    async fn read_capped(&self, response: reqwest::Response) -> SyncResult<Vec<u8>> {
        let mut response = response
            .error_for_status()
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?
        {
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(SyncError::Wire(WireError::ResponseTooLarge {
                    size: body.len() + chunk.len(),
                    max: self.max_response_bytes,
                }));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    async fn get(&self, url: String) -> SyncResult<ApiResponse> {
        trace!(%url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("GET {url}: {e}")))?;
        let body = self.read_capped(response).await?;
        Ok(decode_response(&body, self.max_response_bytes)?)
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn get_index(&self, kind: EntityKind) -> SyncResult<ApiResponse> {
        self.get(self.endpoint_url(kind, "index.json")).await
    }

    async fn get_page(
        &self,
        kind: EntityKind,
        cache: &CacheLink,
        page: u32,
    ) -> SyncResult<ApiResponse> {
        let tail = format!("{}/{page}.json", cache.response_url);
        self.get(self.endpoint_url(kind, &tail)).await
    }

    async fn get_manifest(
        &self,
        kind: EntityKind,
        cache: &CacheLink,
        page: u32,
    ) -> SyncResult<ApiResponse> {
        let tail = format!("{}/manifest/{page}.json", cache.response_url);
        self.get(self.endpoint_url(kind, &tail)).await
    }

    async fn post_delta(
        &self,
        kind: EntityKind,
        request: &DeltaRequest,
    ) -> SyncResult<ApiResponse> {
        // The delta request POSTs to the endpoint root.
        let url = format!(
            "{}/{}/v0/{}",
            self.base_url,
            self.subprotocol,
            kind.endpoint()
        );
        trace!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .body(request.encode()?)
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("POST {url}: {e}")))?;
        let body = self.read_capped(response).await?;
        Ok(decode_response(&body, self.max_response_bytes)?)
    }
}
