//! Per-namespace blob storage.
//!
//! Each entry is stored at `<cache_dir>/<namespace dir>/<key>.blob` as a
//! 4-byte little-endian header length, a bincode header, and the payload.
//! The header identifies what the payload belongs to (namespace, source path
//! and full source digest), when it was written, and a checksum of the
//! payload, so that corruption or key collisions read as misses.

use std::io::Read;
use std::path::{Path, PathBuf};

use rescan_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::fsutil;
use crate::key::CacheKey;
use crate::namespace::NamespaceKind;

/// Magic bytes identifying a rescan cache blob.
const BLOB_MAGIC: [u8; 4] = *b"RSCN";

/// Current blob format version. Increment on breaking changes to the header.
const BLOB_FORMAT_VERSION: u32 = 1;

/// Upper bound on an encoded header; anything larger is corruption.
const MAX_HEADER_LEN: usize = 64 * 1024;

/// File extension for blobs.
pub const BLOB_EXT: &str = "blob";

/// Header prepended to every blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobHeader {
    /// Magic bytes: must be `b"RSCN"`.
    pub magic: [u8; 4],

    /// Blob format version.
    pub format_version: u32,

    /// Payload schema version supplied by the codec (0 for raw bytes).
    pub schema_version: u32,

    /// Namespace label, e.g. `"pattern:todo"`.
    pub namespace: String,

    /// Normalized path of the source file.
    pub source_path: String,

    /// Digest of the source file when the payload was computed.
    pub source_digest: ContentHash,

    /// Write time, milliseconds since the unix epoch.
    pub written_at_ms: u64,

    /// Content hash of the payload.
    pub checksum: ContentHash,
}

/// Everything needed to describe a payload being written.
pub struct BlobMeta<'a> {
    /// Namespace label.
    pub namespace: &'a str,
    /// Normalized source path.
    pub source_path: &'a str,
    /// Source digest.
    pub source_digest: ContentHash,
    /// Payload schema version.
    pub schema_version: u32,
}

/// Blob files for all namespaces under one cache root.
pub struct BlobStore {
    cache_dir: PathBuf,
}

impl BlobStore {
    /// Creates a store rooted at the given cache directory.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Directory of a compartment.
    pub fn dir(&self, kind: NamespaceKind) -> PathBuf {
        self.cache_dir.join(kind.dir_name())
    }

    /// Path of the blob for `key`.
    pub fn blob_path(&self, kind: NamespaceKind, key: &CacheKey) -> PathBuf {
        self.dir(kind).join(format!("{}.{BLOB_EXT}", key.as_str()))
    }

    /// Writes a payload, replacing any previous blob with the same key.
    pub fn write_blob(
        &self,
        kind: NamespaceKind,
        key: &CacheKey,
        meta: &BlobMeta<'_>,
        payload: &[u8],
        written_at_ms: u64,
    ) -> Result<PathBuf, CacheError> {
        let header = BlobHeader {
            magic: BLOB_MAGIC,
            format_version: BLOB_FORMAT_VERSION,
            schema_version: meta.schema_version,
            namespace: meta.namespace.to_string(),
            source_path: meta.source_path.to_string(),
            source_digest: meta.source_digest,
            written_at_ms,
            checksum: ContentHash::from_bytes(payload),
        };
        let bytes = encode_blob(&header, payload)?;
        let path = self.blob_path(kind, key);
        fsutil::atomic_write(&path, &bytes)?;
        Ok(path)
    }

    /// Reads and validates a blob.
    ///
    /// Returns `Ok(None)` if there is no blob for `key`, and an error if the
    /// file exists but is unreadable, truncated, or fails validation.
    pub fn read_blob(
        &self,
        kind: NamespaceKind,
        key: &CacheKey,
    ) -> Result<Option<(BlobHeader, Vec<u8>)>, CacheError> {
        let path = self.blob_path(kind, key);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        decode_blob(&path, &raw).map(Some)
    }

    /// Reads only the header of the blob at `path`.
    pub fn read_header(&self, path: &Path) -> Result<BlobHeader, CacheError> {
        let mut file = std::fs::File::open(path).map_err(|e| CacheError::io(path, e))?;
        let mut len_bytes = [0u8; 4];
        file.read_exact(&mut len_bytes)
            .map_err(|_| invalid_header(path, "truncated header length"))?;
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if header_len > MAX_HEADER_LEN {
            return Err(invalid_header(path, "header length out of range"));
        }
        let mut header_bytes = vec![0u8; header_len];
        file.read_exact(&mut header_bytes)
            .map_err(|_| invalid_header(path, "truncated header"))?;
        decode_header(path, &header_bytes)
    }

    /// Lists blob files of a compartment. A missing directory is empty.
    pub fn list(&self, kind: NamespaceKind) -> Result<Vec<PathBuf>, CacheError> {
        fsutil::list_files(&self.dir(kind), BLOB_EXT)
    }
}

fn invalid_header(path: &Path, reason: &str) -> CacheError {
    CacheError::InvalidHeader {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn encode_blob(header: &BlobHeader, payload: &[u8]) -> Result<Vec<u8>, CacheError> {
    let header_bytes = bincode::serde::encode_to_vec(header, bincode::config::standard())
        .map_err(CacheError::serialization)?;

    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(payload);
    Ok(output)
}

fn decode_header(path: &Path, bytes: &[u8]) -> Result<BlobHeader, CacheError> {
    let (header, _): (BlobHeader, usize) =
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| invalid_header(path, &e.to_string()))?;

    if header.magic != BLOB_MAGIC {
        return Err(invalid_header(path, "bad magic bytes"));
    }
    if header.format_version != BLOB_FORMAT_VERSION {
        return Err(invalid_header(
            path,
            &format!("unsupported format version {}", header.format_version),
        ));
    }
    Ok(header)
}

fn decode_blob(path: &Path, raw: &[u8]) -> Result<(BlobHeader, Vec<u8>), CacheError> {
    if raw.len() < 4 {
        return Err(invalid_header(path, "truncated header length"));
    }
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&raw[..4]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    if header_len > MAX_HEADER_LEN || raw.len() < 4 + header_len {
        return Err(invalid_header(path, "truncated header"));
    }

    let header = decode_header(path, &raw[4..4 + header_len])?;
    let payload = &raw[4 + header_len..];

    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }

    Ok((header, payload.to_vec()))
}
