//! The invalidation index: last-known digest per tracked file, plus statistics.
//!
//! Stored as `metadata/index.json` under the cache root. The index is the
//! single authority on whether a cached entry still describes the current
//! file; the blob stores never re-check freshness on their own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rescan_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::fsutil;
use crate::identity::FileDigest;
use crate::stats::Statistics;

/// Current index format version. Increment on breaking changes to the layout
/// of the index or of blob files.
pub const INDEX_VERSION: u32 = 1;

/// Subdirectory holding the index.
const METADATA_SUBDIR: &str = "metadata";

/// Name of the index file within the metadata directory.
const INDEX_FILE: &str = "index.json";

/// Persistent path → digest map with the cache's usage counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheIndex {
    /// Format version that wrote this index.
    pub version: u32,

    /// Creation time, seconds since the unix epoch.
    pub created: u64,

    /// Last recorded digest per normalized file path.
    pub file_digests: BTreeMap<String, ContentHash>,

    /// Usage counters.
    #[serde(default)]
    pub stats: Statistics,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheIndex {
    /// Creates a new, empty index stamped with the current time.
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            created: fsutil::now_millis() / 1000,
            file_digests: BTreeMap::new(),
            stats: Statistics::default(),
        }
    }

    /// Location of the index file under `cache_dir`.
    pub fn path(cache_dir: &Path) -> PathBuf {
        cache_dir.join(METADATA_SUBDIR).join(INDEX_FILE)
    }

    /// Loads the index from the cache directory.
    ///
    /// Returns `Ok(None)` if no index exists yet. Unreadable or malformed
    /// files are errors; the caller decides to start cold.
    pub fn load(cache_dir: &Path) -> Result<Option<Self>, CacheError> {
        let path = Self::path(cache_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| CacheError::IndexParse {
                reason: e.to_string(),
            })
    }

    /// Saves the index, atomically replacing any previous file.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(self).map_err(CacheError::serialization)?;
        fsutil::atomic_write(&Self::path(cache_dir), json.as_bytes())
    }

    /// Returns `true` if this index was written by the current format version.
    pub fn is_compatible(&self) -> bool {
        self.version == INDEX_VERSION
    }

    /// Returns `true` if `path` is tracked and `digest` equals its recorded digest.
    pub fn is_fresh(&self, path: &str, digest: &FileDigest) -> bool {
        self.file_digests
            .get(path)
            .is_some_and(|recorded| digest.matches(recorded))
    }

    /// Upserts the digest for `path`.
    pub fn record(&mut self, path: &str, digest: ContentHash) {
        self.file_digests.insert(path.to_string(), digest);
    }

    /// Removes the record for `path`. Returns `true` if one existed.
    pub fn forget(&mut self, path: &str) -> bool {
        self.file_digests.remove(path).is_some()
    }
}
