//! Content hashing for cache invalidation.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of hex characters in a short hash prefix.
pub const SHORT_HEX_LEN: usize = 8;

/// A 128-bit content hash computed using XXH3.
///
/// Two files with the same `ContentHash` are assumed to have identical content.
/// Any byte difference, including a line-ending change, produces a different hash.
/// Serialized as a 32-character lowercase hex string so that on-disk metadata
/// stays human-readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Returns the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Returns the first [`SHORT_HEX_LEN`] hex characters of the hash.
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(SHORT_HEX_LEN);
        s
    }
}

/// Error returned when a string is not a valid 32-character hex hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseHashError {
    /// The string does not have exactly 32 characters.
    #[error("expected 32 hex characters, got {0}")]
    BadLength(usize),
    /// The string contains a non-hex character.
    #[error("invalid hex character '{0}'")]
    BadChar(char),
}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(ParseHashError::BadLength(s.len()));
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes).map_err(|e| match e {
            // Bytes before `index` were valid hex, so it starts a char.
            hex::FromHexError::InvalidHexCharacter { c, index } => ParseHashError::BadChar(
                s.get(index..).and_then(|rest| rest.chars().next()).unwrap_or(c),
            ),
            _ => ParseHashError::BadLength(s.len()),
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HashVisitor;

        impl Visitor<'_> for HashVisitor {
            type Value = ContentHash;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 32-character hex content hash")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ContentHash, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HashVisitor)
    }
}
