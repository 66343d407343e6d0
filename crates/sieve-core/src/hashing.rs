//! Hashing functions.
//!
//! Two families are used across sieve:
//! - [`hash_with_seed`] (xxh3) for fast, non-cryptographic token hashing
//!   (SimHash votes).
//! - [`Blake3Hasher`] / [`Digest`] for content digests that must be stable
//!   across runs and practically collision-free (exact dedup, group keys).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{Result, SieveError};

/// Blake3 hasher - cryptographically secure, still fast.
#[derive(Debug, Clone, Copy)]
pub struct Blake3Hasher;

impl Blake3Hasher {
    /// Create a new Blake3 hasher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Hash data into a fixed-width [`Digest`].
    #[must_use]
    pub fn digest(&self, data: &[u8]) -> Digest {
        Digest(*blake3::hash(data).as_bytes())
    }
}

impl Default for Blake3Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash with seed for signature-style algorithms.
#[inline]
pub fn hash_with_seed(data: &[u8], seed: u64) -> u64 {
    xxhash_rust::xxh3::xxh3_64_with_seed(data, seed)
}

/// Fixed-width 256-bit content digest.
///
/// Serialized as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// Digest of `data` using blake3.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        Blake3Hasher.digest(data)
    }

    /// Lowercase hex encoding.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| SieveError::InvalidFormat(format!("digest is not hex: {e}")))?;
        let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            SieveError::InvalidFormat(format!("digest must be 32 bytes, got {}", v.len()))
        })?;
        Ok(Self(arr))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_deterministic() {
        let hasher = Blake3Hasher::new();
        let data = b"hello world";

        let h1 = hasher.digest(data);
        let h2 = hasher.digest(data);

        assert_eq!(h1, h2);
        assert_eq!(h1, Digest::of(data));
        assert_ne!(h1, Digest::of(b"hello world!"));
    }

    #[test]
    fn test_hash_with_seed() {
        let data = b"hello";
        let h1 = hash_with_seed(data, 42);
        let h2 = hash_with_seed(data, 42);
        let h3 = hash_with_seed(data, 43);

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_digest_hex_roundtrip() {
        let digest = Digest::of(b"the cat sat");
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Digest::from_hex(&hex).unwrap(), digest);
        assert!(Digest::from_hex("abcd").is_err());
        assert!(Digest::from_hex("zz").is_err());
    }
}
