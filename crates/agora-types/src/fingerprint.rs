use std::fmt;

use serde::{Deserialize, Serialize};

/// Content-derived identity for an entity.
///
/// A `Fingerprint` is a lowercase hex string recomputed from an entity's
/// immutable fields. Fields covered by the fingerprint cannot change without
/// producing a new fingerprint, which makes it a stable identity across the
/// network. The full verification chain (bounds, proof-of-work, signature)
/// lives behind the gate seam; this type only carries the value.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap an existing fingerprint string (e.g. one received on the wire).
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Derive a fingerprint from a domain tag and canonical content bytes.
    ///
    /// The same domain and content always produce the same fingerprint.
    /// Used when authoring entities locally; remote fingerprints arrive on
    /// the wire and are re-derived by the verification gate, not here.
    pub fn derive(domain: &str, content: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain.as_bytes());
        hasher.update(b":");
        hasher.update(content);
        Self(hex::encode(hasher.finalize().as_bytes()))
    }

    /// The fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the fingerprint carries no value.
    ///
    /// Empty fingerprints are never valid identities; the merge store skips
    /// any candidate whose identity columns are empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short form (first 8 characters) for log output.
    ///
    /// Fingerprints arrive on the wire unconstrained, so the cut must land
    /// on a char boundary rather than a byte offset.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl From<&str> for Fingerprint {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
