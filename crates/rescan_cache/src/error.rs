//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// The public read/write path never returns these: they are turned into
/// misses and reported as [`CacheEvent`](crate::CacheEvent)s. This enum is
/// used for internal error propagation within the cache subsystem.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing cache files.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The invalidation index could not be parsed as valid JSON.
    #[error("failed to parse cache index: {reason}")]
    IndexParse {
        /// Description of the parse failure.
        reason: String,
    },

    /// A blob file has an invalid or missing header.
    #[error("invalid blob header in {path}: {reason}")]
    InvalidHeader {
        /// The blob file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The blob file path.
        path: PathBuf,
        /// The expected checksum from the header.
        expected: String,
        /// The actual checksum computed from the payload.
        actual: String,
    },

    /// The payload was written with a different schema version than requested.
    #[error("schema mismatch in {path}: expected {expected}, got {actual}")]
    SchemaMismatch {
        /// The blob file path.
        path: PathBuf,
        /// The schema version the reader expects.
        expected: u32,
        /// The schema version recorded in the blob.
        actual: u32,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// A pattern sub-namespace name is empty.
    #[error("invalid pattern name {name:?}")]
    InvalidPatternName {
        /// The rejected name.
        name: String,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serialization(reason: impl ToString) -> Self {
        Self::Serialization {
            reason: reason.to_string(),
        }
    }
}
