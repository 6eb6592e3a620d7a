use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Fetch-client tuning. All fields have serviceable defaults; deployments
/// override them from the node's TOML config.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// TCP connect timeout, seconds.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout, seconds. Cache pages can be large.
    pub request_timeout_secs: u64,
    /// Absolute ceiling on any single response body, enforced while the
    /// body streams in.
    pub max_response_bytes: usize,
    /// Broken pages or caches tolerated per endpoint before the endpoint
    /// walk aborts.
    pub max_broken_pages: u32,
    /// Gate rejections on one page before the whole page is treated as
    /// broken.
    pub max_bad_entities_per_page: u32,
    /// Address-endpoint walks stop once this many addresses have
    /// accumulated.
    pub address_cap: usize,
    /// Subprotocol path segment in replication URLs.
    pub subprotocol: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
            max_response_bytes: 32 * 1024 * 1024,
            max_broken_pages: 3,
            max_bad_entities_per_page: 3,
            address_cap: 100,
            subprotocol: "c0".into(),
        }
    }
}

impl SyncConfig {
    pub fn from_toml_str(s: &str) -> SyncResult<Self> {
        toml::from_str(s).map_err(|e| SyncError::Config(e.to_string()))
    }
}
