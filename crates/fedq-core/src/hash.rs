//! blake3 digests for row de-duplication and plan fingerprints.

use blake3::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// First 12 hex digits, for log lines.
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    Hash256(hasher.finalize().into())
}

/// Digest of the JSON encoding of `value`.
pub fn hash_serde<T: Serialize>(value: &T) -> Result<Hash256> {
    Ok(hash_bytes(&serde_json::to_vec(value)?))
}
