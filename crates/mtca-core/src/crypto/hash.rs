//! SHA-256 hashing.

use sha2::{Digest, Sha256};

/// Size of a hash digest in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; HASH_SIZE];

/// The all-zero hash, used for tree heads of batches that were never issued.
pub const ZERO_HASH: Hash = [0u8; HASH_SIZE];

/// Hashes a single byte slice.
#[must_use]
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental SHA-256 hasher for multi-part messages.
///
/// Used wherever a digest covers a domain separator followed by positional
/// context and payload bytes, without concatenating into a scratch buffer.
#[derive(Debug, Default)]
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    /// Creates a fresh hasher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Feeds bytes into the digest.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalizes the digest.
    #[must_use]
    pub fn finalize(self) -> Hash {
        self.inner.finalize().into()
    }
}
