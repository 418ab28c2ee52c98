//! Pluggable payload codecs.
//!
//! The store only persists bytes. A [`Codec`] turns a typed value into bytes
//! and back, and carries a schema version that is recorded with every entry:
//! bump it when the value's shape changes and old entries become misses.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

/// Converts typed values to and from cached payload bytes.
pub trait Codec {
    /// The decoded value type.
    type Value;

    /// Version of the payload layout produced by [`encode`](Self::encode).
    fn schema_version(&self) -> u32;

    /// Serializes a value.
    fn encode(&self, value: &Self::Value) -> Result<Vec<u8>, CacheError>;

    /// Deserializes a value.
    fn decode(&self, bytes: &[u8]) -> Result<Self::Value, CacheError>;
}

/// Compact binary codec using bincode's serde integration.
pub struct BincodeCodec<T> {
    schema_version: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    /// Creates a codec tagging payloads with `schema_version`.
    pub fn new(schema_version: u32) -> Self {
        Self {
            schema_version,
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Codec for BincodeCodec<T> {
    type Value = T;

    fn schema_version(&self) -> u32 {
        self.schema_version
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        bincode::serde::encode_to_vec(value, bincode::config::standard())
            .map_err(CacheError::serialization)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CacheError> {
        let (value, read) =
            bincode::serde::decode_from_slice::<T, _>(bytes, bincode::config::standard())
                .map_err(CacheError::serialization)?;
        if read != bytes.len() {
            return Err(CacheError::serialization(format!(
                "{} trailing bytes after payload",
                bytes.len() - read
            )));
        }
        Ok(value)
    }
}

/// Human-readable codec using JSON.
pub struct JsonCodec<T> {
    schema_version: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Creates a codec tagging payloads with `schema_version`.
    pub fn new(schema_version: u32) -> Self {
        Self {
            schema_version,
            _marker: PhantomData,
        }
    }
}

impl<T: Serialize + DeserializeOwned> Codec for JsonCodec<T> {
    type Value = T;

    fn schema_version(&self) -> u32 {
        self.schema_version
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(value).map_err(CacheError::serialization)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, CacheError> {
        serde_json::from_slice(bytes).map_err(CacheError::serialization)
    }
}
