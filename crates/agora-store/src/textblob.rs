//! Transparent compression for large text columns.
//!
//! Board descriptions, thread and post bodies, and key info blobs can be
//! large; they are stored as flagged BLOBs, zstd-compressed when that pays
//! off, and decompressed transparently on read. The one-byte flag prefix
//! keeps the column self-describing.

use thiserror::Error;

const FLAG_RAW: u8 = 0;
const FLAG_ZSTD: u8 = 1;

/// A stored text blob could not be decoded.
#[derive(Debug, Error)]
#[error("text blob corrupt: {0}")]
pub struct BlobError(pub String);

/// Encode a text field for storage.
///
/// Short fields are stored raw; fields at or above `threshold` are
/// compressed, falling back to raw when compression does not shrink them.
pub fn pack(text: &str, threshold: usize) -> Vec<u8> {
    if text.len() >= threshold {
        if let Ok(compressed) = zstd::encode_all(text.as_bytes(), 0) {
            if compressed.len() + 1 < text.len() {
                let mut out = Vec::with_capacity(compressed.len() + 1);
                out.push(FLAG_ZSTD);
                out.extend_from_slice(&compressed);
                return out;
            }
        }
    }
    let mut out = Vec::with_capacity(text.len() + 1);
    out.push(FLAG_RAW);
    out.extend_from_slice(text.as_bytes());
    out
}

/// Decode a stored text field.
pub fn unpack(blob: &[u8]) -> Result<String, BlobError> {
    let (flag, rest) = blob
        .split_first()
        .ok_or_else(|| BlobError("empty blob".into()))?;
    let bytes = match *flag {
        FLAG_RAW => rest.to_vec(),
        FLAG_ZSTD => zstd::decode_all(rest).map_err(|e| BlobError(e.to_string()))?,
        other => return Err(BlobError(format!("unknown flag byte {other}"))),
    };
    String::from_utf8(bytes).map_err(|e| BlobError(e.to_string()))
}
