//! Hashing - SHA-256 Fingerprints
//!
//! Used for the design cache's prompt index and for page ETags.

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Strong ETag for a rendered page
pub fn page_etag(body: &[u8]) -> String {
    let digest = sha256_hex(body);
    format!("\"{}\"", &digest[..32])
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
