use serde::{Deserialize, Serialize};

use agora_types::{Fingerprint, Timestamp};

/// One manifest line: which page of a cache holds which entity, at which
/// update age.
///
/// Manifests are a download-avoidance hint, never authoritative content: the
/// fetch client uses them to skip pages whose entities are already known and
/// not stale, and the same triples double as the per-cache fingerprint index
/// for point queries (the page number allows a direct jump).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestEntry {
    pub fingerprint: Fingerprint,
    pub last_update: Timestamp,
    pub page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_tolerate_missing_wire_fields() {
        let entry: ManifestEntry = serde_json::from_str(r#"{"fingerprint":"a"}"#).unwrap();
        assert_eq!(entry.fingerprint, Fingerprint::new("a"));
        assert!(entry.last_update.is_zero());
        assert_eq!(entry.page, 0);
    }
}
