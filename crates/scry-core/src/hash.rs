//! Content hashing.
//!
//! SHA-256 digests over raw bytes, rendered as lowercase hex. Used as cache
//! keys for parsed source spans: identical text always produces the same
//! hash, so a hash match is a cheap first-stage equality check.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// ContentHash
// ============================================================================

/// SHA-256 hash of content, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute the hash of raw bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        ContentHash(hex::encode(result))
    }

    /// Create from an existing hex string (no validation).
    pub fn from_hex_unchecked(hex: &str) -> Self {
        ContentHash(hex.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
