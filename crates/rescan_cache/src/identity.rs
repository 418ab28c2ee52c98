//! Source file content identity and change detection.
//!
//! Computes content digests for source files and compares them against the
//! invalidation index to identify which files are new, modified, deleted,
//! or unchanged since their results were cached.

use std::collections::BTreeMap;
use std::path::Path;

use rescan_common::ContentHash;

use crate::error::CacheError;
use crate::index::CacheIndex;

/// The identity of a file's current contents.
///
/// `Unknown` is produced when the file cannot be read. It never matches any
/// recorded digest, so an unreadable file is always treated as changed.
/// There is deliberately no `PartialEq`: compare with [`FileDigest::matches`].
#[derive(Clone, Copy, Debug)]
pub enum FileDigest {
    /// The file was read and hashed.
    Known(ContentHash),
    /// The file could not be read.
    Unknown,
}

impl FileDigest {
    /// Returns the hash if the file was readable.
    pub fn known(&self) -> Option<ContentHash> {
        match self {
            FileDigest::Known(hash) => Some(*hash),
            FileDigest::Unknown => None,
        }
    }

    /// Returns `true` if this digest equals a previously recorded one.
    pub fn matches(&self, recorded: &ContentHash) -> bool {
        matches!(self, FileDigest::Known(hash) if hash == recorded)
    }

    /// The short fragment embedded in cache keys.
    pub fn fragment(&self) -> String {
        match self {
            FileDigest::Known(hash) => hash.short(),
            FileDigest::Unknown => "unknown".to_string(),
        }
    }
}

/// Result of comparing current source file digests against the invalidation index.
///
/// Paths are the normalized, root-relative strings used as index keys.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Files that are not present in the index.
    pub new_files: Vec<String>,

    /// Files whose digest differs from the index.
    pub modified_files: Vec<String>,

    /// Files present in the index but not readable in the current file set.
    pub deleted_files: Vec<String>,

    /// Files whose digest matches the index.
    pub unchanged_files: Vec<String>,
}

impl ChangeSet {
    /// Returns `true` if there are no changes (no new, modified, or deleted files).
    pub fn is_empty(&self) -> bool {
        self.new_files.is_empty() && self.modified_files.is_empty() && self.deleted_files.is_empty()
    }

    /// Returns the total number of files that need reprocessing (new + modified).
    pub fn dirty_count(&self) -> usize {
        self.new_files.len() + self.modified_files.len()
    }
}

/// Utility for computing content digests of source files and detecting changes.
pub struct SourceHasher;

impl SourceHasher {
    /// Computes the content hash of a single file.
    pub fn hash_file(path: &Path) -> Result<ContentHash, CacheError> {
        let content = std::fs::read(path).map_err(|e| CacheError::io(path, e))?;
        Ok(ContentHash::from_bytes(&content))
    }

    /// Computes the digest of a file, degrading read failures to [`FileDigest::Unknown`].
    pub fn digest(path: &Path) -> FileDigest {
        match Self::hash_file(path) {
            Ok(hash) => FileDigest::Known(hash),
            Err(err) => {
                tracing::trace!(
                    target: "rescan.cache",
                    path = %path.display(),
                    error = %err,
                    "source file unreadable, digest unknown"
                );
                FileDigest::Unknown
            }
        }
    }

    /// Compares current digests against the index to detect changes.
    ///
    /// Tracked files missing from `current` are reported as deleted.
    pub fn detect_changes(
        current: &BTreeMap<String, ContentHash>,
        index: &CacheIndex,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for (path, hash) in current {
            match index.file_digests.get(path) {
                Some(recorded) if recorded == hash => changes.unchanged_files.push(path.clone()),
                Some(_) => changes.modified_files.push(path.clone()),
                None => changes.new_files.push(path.clone()),
            }
        }

        changes.deleted_files = index
            .file_digests
            .keys()
            .filter(|p| !current.contains_key(*p))
            .cloned()
            .collect();

        changes
    }
}
