//! Content fingerprints used as cache keys.
//!
//! Parts are length-prefixed before hashing so that `["ab", "c"]` and
//! `["a", "bc"]` never collide. The SHA-256 digest is truncated to
//! [`FINGERPRINT_LEN`] hex characters (128 bits), which keeps accidental
//! collisions negligible for a response cache while halving key size.

use sha2::{Digest, Sha256};
use std::fmt;

/// Hex characters kept from the digest.
pub const FINGERPRINT_LEN: usize = 32;

/// Hex characters kept for upload content ids.
pub const CONTENT_ID_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Start a fingerprint for the given type tag, usually the endpoint name.
    pub fn builder(tag: &str) -> FingerprintBuilder {
        FingerprintBuilder::new(tag)
    }

    /// Fingerprint a tag and a list of string parts.
    pub fn of(tag: &str, parts: &[&str]) -> Self {
        parts
            .iter()
            .fold(Self::builder(tag), |builder, part| builder.part(part))
            .finish()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    fn new(tag: &str) -> Self {
        Self {
            hasher: Sha256::new(),
        }
        .part(tag)
    }

    pub fn part(mut self, part: impl AsRef<[u8]>) -> Self {
        let bytes = part.as_ref();
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn finish(self) -> Fingerprint {
        let mut digest = hex::encode(self.hasher.finalize());
        digest.truncate(FINGERPRINT_LEN);
        Fingerprint(digest)
    }
}

/// Short identifier of uploaded content, exposed to clients as a request id.
pub fn content_id(content: &[u8]) -> String {
    let mut digest = hex::encode(Sha256::digest(content));
    digest.truncate(CONTENT_ID_LEN);
    digest
}
