use serde::{Deserialize, Serialize};

use agora_types::{Address, Client, Protocol, Timestamp};

use crate::error::{WireError, WireResult};

/// A filter in the delta POST body. Only timestamp filters exist today; the
/// list form matches the wire schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFilter {
    #[serde(rename = "type")]
    pub filter_type: String,
    pub values: Vec<Timestamp>,
}

impl TimeFilter {
    /// "Entities newer than `since`".
    pub fn since(since: Timestamp) -> Self {
        Self {
            filter_type: "timestamp".into(),
            values: vec![since],
        }
    }
}

/// The POST body of the delta endpoint: a timestamp filter plus the caller's
/// self-description, signed the same way a response envelope is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaRequest {
    pub node_public_key: String,
    /// Signature over this request with the field blanked.
    pub page_signature: String,
    /// The caller's own address, so the remote can gossip it onward.
    pub address: Address,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<TimeFilter>,
}

impl DeltaRequest {
    /// Build a delta request asking for entities newer than `since`.
    pub fn since(since: Timestamp, caller: Address) -> Self {
        Self {
            address: caller,
            filters: vec![TimeFilter::since(since)],
            ..Default::default()
        }
    }

    /// The timestamp filter value, if one is present.
    pub fn since_value(&self) -> Option<Timestamp> {
        self.filters
            .iter()
            .find(|f| f.filter_type == "timestamp")
            .and_then(|f| f.values.first().copied())
    }

    pub fn encode(&self) -> WireResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| WireError::Encode(e.to_string()))
    }
}

/// Convenience constructor for the caller's self-description.
pub fn self_description(
    location: impl Into<String>,
    port: u16,
    protocol: Protocol,
    client: Client,
) -> Address {
    Address {
        location: location.into(),
        port,
        protocol,
        client,
        ..Default::default()
    }
}
