//! Network address schema.
//!
//! An address is not content: it has no fingerprint, no proofs, and no
//! signature. It is identified by (location, sublocation, port). Addresses
//! reach storage over two disjoint paths: the untrusted gossip path, which
//! may only create identity-only rows, and the trusted direct-connection
//! path, which may overwrite liveness and version metadata.

use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::timestamp::Timestamp;

/// A subprotocol a node speaks, keyed by a content fingerprint and joined to
/// addresses via a many-to-many junction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Subprotocol {
    pub fingerprint: Fingerprint,
    pub name: String,
    pub version_major: u8,
    pub version_minor: u16,
    pub supported_entities: Vec<String>,
}

/// Protocol metadata self-reported by a node over a trusted connection.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Protocol {
    pub version_major: u8,
    pub version_minor: u16,
    pub subprotocols: Vec<Subprotocol>,
}

/// Client software metadata self-reported by a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Client {
    pub version_major: u8,
    pub version_minor: u16,
    pub version_patch: u16,
    pub name: String,
}

/// A peer's network location.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Address {
    pub location: String,
    pub sublocation: String,
    pub port: u16,
    pub ip_type: u8,
    pub address_type: u8,
    pub last_online: Timestamp,
    pub protocol: Protocol,
    pub client: Client,
    #[serde(skip)]
    pub local_arrival: Timestamp,
}

impl Address {
    /// Identity columns are present: location and port.
    pub fn identity_present(&self) -> bool {
        !self.location.is_empty() && self.port != 0
    }

    /// Strip everything except the identity columns.
    ///
    /// The untrusted batch path stores addresses in this form only, so that
    /// third-party-reported liveness and version metadata never enters the
    /// local table.
    pub fn identity_only(&self) -> Address {
        Address {
            location: self.location.clone(),
            sublocation: self.sublocation.clone(),
            port: self.port,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_address() -> Address {
        Address {
            location: "example.com".into(),
            sublocation: "node".into(),
            port: 49120,
            ip_type: 4,
            address_type: 2,
            last_online: Timestamp::new(777),
            protocol: Protocol {
                version_major: 1,
                version_minor: 4,
                subprotocols: vec![Subprotocol {
                    fingerprint: Fingerprint::new("sp1"),
                    name: "c0".into(),
                    version_major: 1,
                    version_minor: 0,
                    supported_entities: vec!["board".into()],
                }],
            },
            client: Client {
                version_major: 2,
                version_minor: 0,
                version_patch: 1,
                name: "agora".into(),
            },
            local_arrival: Timestamp::new(10),
        }
    }

    #[test]
    fn identity_only_strips_metadata() {
        let stripped = full_address().identity_only();
        assert_eq!(stripped.location, "example.com");
        assert_eq!(stripped.sublocation, "node");
        assert_eq!(stripped.port, 49120);
        assert_eq!(stripped.ip_type, 0);
        assert!(stripped.last_online.is_zero());
        assert_eq!(stripped.protocol, Protocol::default());
        assert_eq!(stripped.client, Client::default());
    }

    #[test]
    fn identity_requires_location_and_port() {
        assert!(full_address().identity_present());
        let mut addr = full_address();
        addr.port = 0;
        assert!(!addr.identity_present());
        let mut addr = full_address();
        addr.location.clear();
        assert!(!addr.identity_present());
    }
}
