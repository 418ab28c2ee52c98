//! High-level cache orchestrator.
//!
//! The `Cache` type ties together the invalidation index, the per-namespace
//! blob stores, key derivation and the statistics counters into a single
//! interface for analysis tools. It handles loading or creating the cache,
//! answering lookups, storing results, explicit invalidation and the two
//! maintenance sweeps (clear and age-based optimize).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rescan_common::ContentHash;
use serde::Serialize;

use crate::artifact::{BlobHeader, BlobMeta, BlobStore};
use crate::codec::Codec;
use crate::event::{CacheEvent, EventSink, MissReason, TracingSink};
use crate::fsutil;
use crate::identity::{ChangeSet, FileDigest, SourceHasher};
use crate::index::{CacheIndex, INDEX_VERSION};
use crate::key::{self, CacheKey, KeyDeriver};
use crate::namespace::{ClearTarget, Namespace, NamespaceKind};
use crate::stats::StatsSnapshot;

/// Schema version recorded for payloads written through the raw byte API.
const RAW_SCHEMA: u32 = 0;

/// Settings for opening a [`Cache`].
#[derive(Clone)]
pub struct CacheOptions {
    /// Cache root directory.
    pub cache_dir: PathBuf,
    /// Project root that cache keys are relative to.
    pub project_root: PathBuf,
    /// When `false`, lookups miss and writes are skipped.
    pub enabled: bool,
    /// Receiver for cache events.
    pub sink: Arc<dyn EventSink>,
}

impl CacheOptions {
    /// Options with caching enabled and events forwarded to `tracing`.
    pub fn new(cache_dir: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            project_root: project_root.into(),
            enabled: true,
            sink: Arc::new(TracingSink),
        }
    }

    /// Enables or disables the read/write path.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replaces the event sink.
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }
}

/// Entry count and size of one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceUsage {
    /// Namespace or compartment name.
    pub name: String,
    /// Number of blob files.
    pub entries: usize,
    /// Total size of the blob files in bytes.
    pub bytes: u64,
}

/// Everything `cache stats` shows.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    /// Cache root directory.
    pub cache_dir: PathBuf,
    /// Usage counters.
    pub stats: StatsSnapshot,
    /// One entry per compartment: `parse`, `patterns`, `analysis`.
    pub namespaces: Vec<NamespaceUsage>,
    /// Breakdown of the `patterns` compartment by pattern namespace.
    pub patterns: Vec<NamespaceUsage>,
    /// Number of files in the invalidation index.
    pub tracked_files: usize,
    /// Total bytes on disk, blobs plus index.
    pub total_bytes: u64,
}

/// Content-addressed cache for per-file analysis results.
///
/// All reads and writes are fail-open: a missing, corrupt or unwritable
/// cache turns into misses and skipped writes, reported through the
/// configured [`EventSink`].
pub struct Cache {
    /// Root directory for all cache files.
    cache_dir: PathBuf,

    /// Derives keys and normalized paths.
    keys: KeyDeriver,

    /// Blob files of every namespace.
    store: BlobStore,

    /// Path → digest records and counters.
    index: CacheIndex,

    enabled: bool,

    sink: Arc<dyn EventSink>,

    /// Counters changed by reads and not yet written.
    stats_dirty: bool,
}

impl Cache {
    /// Loads an existing cache or creates a fresh one.
    ///
    /// A missing index starts an empty cache. An unreadable, malformed or
    /// incompatible index is discarded (reported as
    /// [`CacheEvent::IndexReset`]) and the cache starts cold.
    pub fn open(options: CacheOptions) -> Self {
        let CacheOptions {
            cache_dir,
            project_root,
            enabled,
            sink,
        } = options;

        let index = match CacheIndex::load(&cache_dir) {
            Ok(Some(index)) if index.is_compatible() => index,
            Ok(Some(index)) => {
                sink.emit(&CacheEvent::IndexReset {
                    reason: format!(
                        "index version {} does not match {INDEX_VERSION}",
                        index.version
                    ),
                });
                CacheIndex::new()
            }
            Ok(None) => CacheIndex::new(),
            Err(err) => {
                sink.emit(&CacheEvent::IndexReset {
                    reason: err.to_string(),
                });
                CacheIndex::new()
            }
        };

        Self {
            store: BlobStore::new(&cache_dir),
            keys: KeyDeriver::new(&project_root),
            cache_dir,
            index,
            enabled,
            sink,
            stats_dirty: false,
        }
    }

    /// Opens a cache with default options.
    pub fn load_or_create(cache_dir: &Path, project_root: &Path) -> Self {
        Self::open(CacheOptions::new(cache_dir, project_root))
    }

    /// The cache root directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// The invalidation index.
    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    /// Computes the current digest of `path`.
    pub fn digest(&self, path: &Path) -> FileDigest {
        SourceHasher::digest(&self.keys.resolve(path))
    }

    /// Derives the key `path` would be stored under in `namespace` right now.
    pub fn derive_key(&self, path: &Path, namespace: &Namespace) -> CacheKey {
        self.keys.derive_key(path, namespace, &self.digest(path))
    }

    /// Returns `true` if `path` is tracked and its bytes are unchanged.
    pub fn is_fresh(&self, path: &Path) -> bool {
        let normalized = self.keys.normalize(path);
        self.index.is_fresh(&normalized, &self.digest(path))
    }

    /// Records `digest` as the last known digest of `path`.
    pub fn record(&mut self, path: &Path, digest: ContentHash) {
        let normalized = self.keys.normalize(path);
        self.index.record(&normalized, digest);
        self.persist();
    }

    /// Forgets the index record for `path`. Returns `true` if one existed.
    pub fn forget(&mut self, path: &Path) -> bool {
        let normalized = self.keys.normalize(path);
        let existed = self.index.forget(&normalized);
        if existed {
            self.persist();
        }
        existed
    }

    /// Looks up the payload cached for `path` in `namespace`.
    pub fn get(&mut self, namespace: &Namespace, path: &Path) -> Option<Vec<u8>> {
        let normalized = self.keys.normalize(path);
        let outcome = self.lookup(namespace, path, &normalized, None);
        self.finish_lookup(namespace, &normalized, outcome)
    }

    /// Looks up and decodes the value cached for `path` in `namespace`.
    ///
    /// Entries written with a different schema version, or that fail to
    /// decode, are misses.
    pub fn get_with<C: Codec>(
        &mut self,
        namespace: &Namespace,
        path: &Path,
        codec: &C,
    ) -> Option<C::Value> {
        let normalized = self.keys.normalize(path);
        let outcome = self
            .lookup(namespace, path, &normalized, Some(codec.schema_version()))
            .and_then(|(blob_path, payload)| match codec.decode(&payload) {
                Ok(value) => Ok((blob_path, value)),
                Err(err) => {
                    self.sink.emit(&CacheEvent::Corrupt {
                        path: blob_path,
                        error: err.to_string(),
                    });
                    Err(MissReason::Corrupt)
                }
            });
        self.finish_lookup(namespace, &normalized, outcome)
    }

    /// Stores `payload` for `path` in `namespace` and records the file's digest.
    pub fn put(&mut self, namespace: &Namespace, path: &Path, payload: &[u8]) {
        self.store_payload(namespace, path, RAW_SCHEMA, payload);
    }

    /// Encodes `value` with `codec` and stores it like [`put`](Self::put).
    pub fn put_with<C: Codec>(
        &mut self,
        namespace: &Namespace,
        path: &Path,
        codec: &C,
        value: &C::Value,
    ) {
        if !self.enabled {
            return;
        }
        match codec.encode(value) {
            Ok(payload) => self.store_payload(namespace, path, codec.schema_version(), &payload),
            Err(err) => self.sink.emit(&CacheEvent::StoreFailed {
                namespace: namespace.label(),
                path: self.keys.normalize(path),
                error: err.to_string(),
            }),
        }
    }

    /// Removes every namespace's entries for `path` and forgets its record.
    ///
    /// Returns the number of entries removed; 0 if the file was never cached.
    pub fn invalidate_file(&mut self, path: &Path) -> usize {
        let normalized = self.keys.normalize(path);
        let token = self.keys.path_token(&normalized);

        let mut removed = 0;
        for kind in NamespaceKind::ALL {
            removed += self.remove_matching(kind, |stem, header| {
                let Some((path_token, _)) = key::split_stem(stem) else {
                    return false;
                };
                path_token == token
                    && header.map_or(true, |h| h.source_path == normalized)
            });
        }

        let forgot = self.index.forget(&normalized);
        self.index.stats.record_invalidations(removed);
        if forgot || removed > 0 {
            self.persist();
        }
        self.sink.emit(&CacheEvent::Removed {
            scope: format!("invalidate {normalized}"),
            count: removed,
        });
        removed
    }

    /// Deletes entries of the targeted namespace(s).
    ///
    /// Clearing everything also forgets every index record and resets the
    /// statistics. Returns the number of entries removed.
    pub fn clear(&mut self, target: &ClearTarget) -> usize {
        let removed = match target {
            ClearTarget::All => {
                let removed: usize = NamespaceKind::ALL
                    .into_iter()
                    .map(|kind| self.remove_matching(kind, |_, _| true))
                    .sum();
                let had_state = !self.index.file_digests.is_empty()
                    || self.index.stats != Default::default();
                self.index.file_digests.clear();
                self.index.stats.reset();
                if had_state || removed > 0 {
                    self.persist();
                }
                removed
            }
            ClearTarget::Kind(kind) => self.remove_counted(*kind, |_, _| true),
            ClearTarget::Pattern(name) => {
                let namespace = Namespace::Pattern(name.clone());
                let label = namespace.label();
                let token = key::namespace_token(&namespace);
                self.remove_counted(NamespaceKind::Patterns, |stem, header| {
                    match header {
                        Some(h) => h.namespace == label,
                        None => key::split_stem(stem).is_some_and(|(_, ns)| ns == token),
                    }
                })
            }
        };

        let scope = match target {
            ClearTarget::All => "clear all".to_string(),
            ClearTarget::Kind(kind) => format!("clear {kind}"),
            ClearTarget::Pattern(name) => format!("clear pattern:{name}"),
        };
        self.sink.emit(&CacheEvent::Removed {
            scope,
            count: removed,
        });
        removed
    }

    /// Removes entries written more than `max_age` ago.
    ///
    /// The index is left alone: an evicted entry of an unchanged file is
    /// simply a miss next time.
    pub fn optimize(&mut self, max_age: Duration) -> usize {
        self.optimize_at(max_age, SystemTime::now())
    }

    /// [`optimize`](Self::optimize) with an explicit current time.
    ///
    /// Entries whose header cannot be read are removed as well.
    pub fn optimize_at(&mut self, max_age: Duration, now: SystemTime) -> usize {
        let now_ms = fsutil::system_time_millis(now);
        let max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);

        let removed: usize = NamespaceKind::ALL
            .into_iter()
            .map(|kind| {
                self.remove_counted(kind, |_, header| match header {
                    Some(h) => now_ms.saturating_sub(h.written_at_ms) > max_age_ms,
                    None => true,
                })
            })
            .sum();

        self.sink.emit(&CacheEvent::Removed {
            scope: "optimize".to_string(),
            count: removed,
        });
        removed
    }

    /// A snapshot of the usage counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.index.stats.snapshot(INDEX_VERSION)
    }

    /// Counters plus per-namespace entry counts and sizes.
    pub fn report(&self) -> CacheReport {
        let mut namespaces = Vec::with_capacity(NamespaceKind::ALL.len());
        let mut patterns: BTreeMap<String, NamespaceUsage> = BTreeMap::new();
        let mut total_bytes = 0;

        for kind in NamespaceKind::ALL {
            let mut usage = NamespaceUsage {
                name: kind.dir_name().to_string(),
                entries: 0,
                bytes: 0,
            };
            for path in self.list_or_report(kind) {
                let bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                usage.entries += 1;
                usage.bytes += bytes;

                if kind == NamespaceKind::Patterns {
                    let name = self
                        .store
                        .read_header(&path)
                        .map(|h| h.namespace)
                        .unwrap_or_else(|_| "pattern:<unreadable>".to_string());
                    let entry = patterns.entry(name.clone()).or_insert(NamespaceUsage {
                        name,
                        entries: 0,
                        bytes: 0,
                    });
                    entry.entries += 1;
                    entry.bytes += bytes;
                }
            }
            total_bytes += usage.bytes;
            namespaces.push(usage);
        }

        total_bytes += std::fs::metadata(CacheIndex::path(&self.cache_dir))
            .map(|m| m.len())
            .unwrap_or(0);

        CacheReport {
            cache_dir: self.cache_dir.clone(),
            stats: self.stats(),
            namespaces,
            patterns: patterns.into_values().collect(),
            tracked_files: self.index.file_digests.len(),
            total_bytes,
        }
    }

    /// Every tracked file with its recorded digest, sorted by path.
    pub fn tracked_files(&self) -> Vec<(String, ContentHash)> {
        self.index
            .file_digests
            .iter()
            .map(|(path, digest)| (path.clone(), *digest))
            .collect()
    }

    /// Classifies `paths` against the index as new, modified or unchanged;
    /// tracked files not among readable `paths` are reported as deleted.
    pub fn detect_changes(&self, paths: &[PathBuf]) -> ChangeSet {
        let current: BTreeMap<String, ContentHash> = paths
            .iter()
            .filter_map(|path| {
                self.digest(path)
                    .known()
                    .map(|hash| (self.keys.normalize(path), hash))
            })
            .collect();
        SourceHasher::detect_changes(&current, &self.index)
    }

    /// Writes counters changed by lookups since the last save.
    pub fn flush(&mut self) {
        if self.stats_dirty {
            self.persist();
        }
    }

    fn lookup(
        &self,
        namespace: &Namespace,
        path: &Path,
        normalized: &str,
        schema: Option<u32>,
    ) -> Result<(PathBuf, Vec<u8>), MissReason> {
        if !self.enabled {
            return Err(MissReason::Disabled);
        }

        let digest = self.digest(path);
        if !self.index.is_fresh(normalized, &digest) {
            return Err(match (&digest, self.index.file_digests.contains_key(normalized)) {
                (_, false) => MissReason::Untracked,
                (FileDigest::Unknown, true) => MissReason::Unreadable,
                (FileDigest::Known(_), true) => MissReason::Changed,
            });
        }
        let Some(source_digest) = digest.known() else {
            return Err(MissReason::Unreadable);
        };

        let kind = namespace.kind();
        let key = self.keys.key_for(normalized, namespace, &digest);
        let blob_path = self.store.blob_path(kind, &key);
        let (header, payload) = match self.store.read_blob(kind, &key) {
            Ok(Some(found)) => found,
            Ok(None) => return Err(MissReason::NotStored),
            Err(err) => {
                self.sink.emit(&CacheEvent::Corrupt {
                    path: blob_path,
                    error: err.to_string(),
                });
                return Err(MissReason::Corrupt);
            }
        };

        // Keys carry only a digest prefix; the header holds the full digest.
        if header.namespace != namespace.label()
            || header.source_path != normalized
            || header.source_digest != source_digest
        {
            return Err(MissReason::NotStored);
        }
        if let Some(expected) = schema {
            if header.schema_version != expected {
                return Err(MissReason::SchemaMismatch);
            }
        }

        Ok((blob_path, payload))
    }

    fn finish_lookup<T>(
        &mut self,
        namespace: &Namespace,
        normalized: &str,
        outcome: Result<(PathBuf, T), MissReason>,
    ) -> Option<T> {
        match outcome {
            Ok((_, value)) => {
                self.index.stats.record_hit();
                self.stats_dirty = true;
                self.sink.emit(&CacheEvent::Hit {
                    namespace: namespace.label(),
                    path: normalized.to_string(),
                });
                Some(value)
            }
            Err(reason) => {
                if reason != MissReason::Disabled {
                    self.index.stats.record_miss();
                    self.stats_dirty = true;
                }
                self.sink.emit(&CacheEvent::Miss {
                    namespace: namespace.label(),
                    path: normalized.to_string(),
                    reason,
                });
                None
            }
        }
    }

    fn store_payload(&mut self, namespace: &Namespace, path: &Path, schema: u32, payload: &[u8]) {
        if !self.enabled {
            return;
        }
        let normalized = self.keys.normalize(path);
        let label = namespace.label();

        // The digest is recomputed here, never reused from an earlier lookup.
        let digest = self.digest(path);
        let Some(source_digest) = digest.known() else {
            self.sink.emit(&CacheEvent::StoreFailed {
                namespace: label,
                path: normalized,
                error: "source file is unreadable".to_string(),
            });
            return;
        };

        let key = self.keys.key_for(&normalized, namespace, &digest);
        let meta = BlobMeta {
            namespace: &label,
            source_path: &normalized,
            source_digest,
            schema_version: schema,
        };
        let written = self.store.write_blob(
            namespace.kind(),
            &key,
            &meta,
            payload,
            fsutil::now_millis(),
        );
        if let Err(err) = written {
            self.sink.emit(&CacheEvent::StoreFailed {
                namespace: label,
                path: normalized,
                error: err.to_string(),
            });
            return;
        }

        self.index.record(&normalized, source_digest);
        self.index.stats.record_write();
        self.persist();
        self.sink.emit(&CacheEvent::Stored {
            namespace: label,
            path: normalized,
            key: key.to_string(),
        });
    }

    /// Removes blobs of `kind` selected by `select`, counting them as invalidations.
    fn remove_counted(
        &mut self,
        kind: NamespaceKind,
        select: impl Fn(&str, Option<&BlobHeader>) -> bool,
    ) -> usize {
        let removed = self.remove_matching(kind, select);
        if removed > 0 {
            self.index.stats.record_invalidations(removed);
            self.persist();
        }
        removed
    }

    /// Removes blobs of `kind` for which `select(stem, header)` holds.
    ///
    /// `header` is `None` when the blob's header cannot be read.
    fn remove_matching(
        &self,
        kind: NamespaceKind,
        select: impl Fn(&str, Option<&BlobHeader>) -> bool,
    ) -> usize {
        let mut removed = 0;
        for path in self.list_or_report(kind) {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let header = self.store.read_header(&path).ok();
            if !select(stem, header.as_ref()) {
                continue;
            }
            match fsutil::remove_file(&path) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => self.sink.emit(&CacheEvent::RemoveFailed {
                    path: path.clone(),
                    error: err.to_string(),
                }),
            }
        }
        removed
    }

    fn list_or_report(&self, kind: NamespaceKind) -> Vec<PathBuf> {
        match self.store.list(kind) {
            Ok(paths) => paths,
            Err(err) => {
                self.sink.emit(&CacheEvent::Corrupt {
                    path: self.store.dir(kind),
                    error: err.to_string(),
                });
                Vec::new()
            }
        }
    }

    fn persist(&mut self) {
        match self.index.save(&self.cache_dir) {
            Ok(()) => self.stats_dirty = false,
            Err(err) => self.sink.emit(&CacheEvent::IndexSaveFailed {
                error: err.to_string(),
            }),
        }
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BincodeCodec, JsonCodec};
    use crate::event::EventLog;

    struct Fixture {
        dir: tempfile::TempDir,
        log: Arc<EventLog>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                log: Arc::new(EventLog::new()),
            }
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("project")
        }

        fn cache_dir(&self) -> PathBuf {
            self.dir.path().join("cache")
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.root().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        fn open(&self) -> Cache {
            Cache::open(
                CacheOptions::new(self.cache_dir(), self.root()).sink(self.log.clone()),
            )
        }
    }

    fn a() -> &'static Path {
        Path::new("a.py")
    }

    #[test]
    fn miss_put_hit() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();

        assert!(cache.get(&Namespace::Parse, a()).is_none());
        cache.put(&Namespace::Parse, a(), b"tree");
        assert_eq!(cache.get(&Namespace::Parse, a()).as_deref(), Some(&b"tree"[..]));

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
        assert_eq!(stats.hit_rate, 50.0);
    }

    #[test]
    fn change_detection_makes_entry_absent() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"tree");
        let stale_blob = cache.store.list(NamespaceKind::Parse).unwrap();
        assert_eq!(stale_blob.len(), 1);

        fx.write("a.py", "x = 2\n");
        assert!(!cache.is_fresh(a()));
        assert!(cache.get(&Namespace::Parse, a()).is_none());
        assert!(stale_blob[0].exists(), "stale bytes remain until evicted");
        assert!(fx.log.events().contains(&CacheEvent::Miss {
            namespace: "parse".to_string(),
            path: "a.py".to_string(),
            reason: MissReason::Changed,
        }));
    }

    #[test]
    fn namespaces_are_isolated() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"tree");

        assert!(cache.get(&Namespace::Analysis, a()).is_none());
        let todo = Namespace::pattern("todo").unwrap();
        let fixme = Namespace::pattern("fixme").unwrap();
        cache.put(&todo, a(), b"[3, 9]");
        assert!(cache.get(&fixme, a()).is_none());
        assert_eq!(cache.get(&todo, a()).as_deref(), Some(&b"[3, 9]"[..]));
    }

    #[test]
    fn untracked_lookup_does_not_touch_storage() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        assert!(cache.get(&Namespace::Parse, a()).is_none());
        assert!(!fx.cache_dir().join("parse").exists());
        assert_eq!(
            fx.log.take_all(),
            vec![CacheEvent::Miss {
                namespace: "parse".to_string(),
                path: "a.py".to_string(),
                reason: MissReason::Untracked,
            }]
        );
    }

    #[test]
    fn unreadable_source_is_never_cached() {
        let fx = Fixture::new();
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, Path::new("missing.py"), b"tree");
        assert!(cache.tracked_files().is_empty());
        assert!(matches!(
            fx.log.events().last(),
            Some(CacheEvent::StoreFailed { .. })
        ));
    }

    #[test]
    fn deleted_source_misses_as_unreadable() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"tree");
        std::fs::remove_file(fx.root().join("a.py")).unwrap();
        assert!(cache.get(&Namespace::Parse, a()).is_none());
        assert!(fx.log.events().contains(&CacheEvent::Miss {
            namespace: "parse".to_string(),
            path: "a.py".to_string(),
            reason: MissReason::Unreadable,
        }));
    }

    #[test]
    fn corrupt_blob_is_a_miss() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"tree");
        let blob = cache.store.list(NamespaceKind::Parse).unwrap().remove(0);
        std::fs::write(&blob, b"garbage").unwrap();

        assert!(cache.get(&Namespace::Parse, a()).is_none());
        assert!(fx
            .log
            .events()
            .iter()
            .any(|e| matches!(e, CacheEvent::Corrupt { .. })));
    }

    #[test]
    fn typed_payloads_roundtrip_and_check_schema() {
        let fx = Fixture::new();
        fx.write("a.py", "import os\n");
        let mut cache = fx.open();
        let v1 = BincodeCodec::<Vec<String>>::new(1);
        let v2 = BincodeCodec::<Vec<String>>::new(2);
        let value = vec!["os".to_string()];

        cache.put_with(&Namespace::Analysis, a(), &v1, &value);
        assert_eq!(cache.get_with(&Namespace::Analysis, a(), &v1), Some(value));
        assert_eq!(cache.get_with(&Namespace::Analysis, a(), &v2), None);
        assert!(fx.log.events().contains(&CacheEvent::Miss {
            namespace: "analysis".to_string(),
            path: "a.py".to_string(),
            reason: MissReason::SchemaMismatch,
        }));
    }

    #[test]
    fn undecodable_payload_is_a_miss() {
        let fx = Fixture::new();
        fx.write("a.py", "x\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Analysis, a(), b"{not json");
        let codec = JsonCodec::<Vec<u32>>::new(0);
        assert_eq!(cache.get_with(&Namespace::Analysis, a(), &codec), None);
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn invalidate_file_removes_every_namespace() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        fx.write("b.py", "y = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"tree");
        cache.put(&Namespace::Analysis, a(), b"summary");
        cache.put(&Namespace::pattern("todo").unwrap(), a(), b"[]");
        cache.put(&Namespace::Parse, Path::new("b.py"), b"tree b");

        assert_eq!(cache.invalidate_file(a()), 3);
        assert!(cache.get(&Namespace::Parse, a()).is_none());
        assert!(cache.get(&Namespace::Analysis, a()).is_none());
        assert!(cache.get(&Namespace::pattern("todo").unwrap(), a()).is_none());
        assert!(cache.get(&Namespace::Parse, Path::new("b.py")).is_some());
        assert_eq!(cache.stats().invalidations, 3);
        assert_eq!(cache.tracked_files().len(), 1);

        assert_eq!(cache.invalidate_file(a()), 0);
        assert_eq!(cache.invalidate_file(Path::new("never.py")), 0);
    }

    #[test]
    fn look_alike_pattern_names_keep_separate_entries() {
        let fx = Fixture::new();
        fx.write("a.py", "eval(x)\n");
        let mut cache = fx.open();
        let slash = Namespace::pattern("no/eval").unwrap();
        let space = Namespace::pattern("no eval").unwrap();
        cache.put(&slash, a(), b"P1");
        cache.put(&space, a(), b"P2");

        assert_ne!(cache.derive_key(a(), &slash), cache.derive_key(a(), &space));
        assert_eq!(cache.get(&slash, a()).as_deref(), Some(&b"P1"[..]));
        assert_eq!(cache.get(&space, a()).as_deref(), Some(&b"P2"[..]));
        assert_eq!(cache.clear(&ClearTarget::Pattern("no eval".to_string())), 1);
        assert_eq!(cache.get(&slash, a()).as_deref(), Some(&b"P1"[..]));
    }

    #[test]
    fn look_alike_paths_with_equal_content_keep_separate_entries() {
        let fx = Fixture::new();
        fx.write("pkg/__init__.py", "");
        fx.write("pkg___init__.py", "");
        let nested = Path::new("pkg/__init__.py");
        let flat = Path::new("pkg___init__.py");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, nested, b"T1");
        cache.put(&Namespace::Parse, flat, b"T2");

        assert_eq!(cache.store.list(NamespaceKind::Parse).unwrap().len(), 2);
        assert_eq!(cache.get(&Namespace::Parse, nested).as_deref(), Some(&b"T1"[..]));
        assert_eq!(cache.get(&Namespace::Parse, flat).as_deref(), Some(&b"T2"[..]));

        assert_eq!(cache.invalidate_file(flat), 1);
        assert_eq!(cache.get(&Namespace::Parse, nested).as_deref(), Some(&b"T1"[..]));
    }

    #[test]
    fn optimize_with_huge_max_age_keeps_everything() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"tree");
        let days = 213_503_982_335u64;
        let max_age = Duration::from_secs(days.saturating_mul(24 * 60 * 60));
        assert_eq!(cache.optimize(max_age), 0);
        assert_eq!(cache.optimize(Duration::MAX), 0);
        assert!(cache.get(&Namespace::Parse, a()).is_some());
    }

    #[test]
    fn invalidate_file_removes_stale_versions_too() {
        let fx = Fixture::new();
        fx.write("a.py", "v1");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"one");
        fx.write("a.py", "v2");
        cache.put(&Namespace::Parse, a(), b"two");
        assert_eq!(cache.store.list(NamespaceKind::Parse).unwrap().len(), 2);
        assert_eq!(cache.invalidate_file(a()), 2);
    }

    #[test]
    fn clear_all_is_idempotent() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"tree");
        cache.put(&Namespace::Analysis, a(), b"summary");
        cache.get(&Namespace::Parse, a());

        assert_eq!(cache.clear(&ClearTarget::All), 2);
        assert_eq!(cache.clear(&ClearTarget::All), 0);
        let stats = cache.stats();
        assert_eq!(
            (stats.hits, stats.misses, stats.writes, stats.invalidations),
            (0, 0, 0, 0)
        );
        assert!(cache.tracked_files().is_empty());
    }

    #[test]
    fn clear_one_kind_keeps_the_others() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"tree");
        cache.put(&Namespace::pattern("todo").unwrap(), a(), b"[1]");
        cache.put(&Namespace::pattern("fixme").unwrap(), a(), b"[2]");

        assert_eq!(cache.clear(&ClearTarget::Kind(NamespaceKind::Patterns)), 2);
        assert!(cache.get(&Namespace::Parse, a()).is_some());
        assert_eq!(cache.stats().invalidations, 2);
        assert_eq!(cache.tracked_files().len(), 1);
    }

    #[test]
    fn clear_single_pattern() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        let todo = Namespace::pattern("todo").unwrap();
        let fixme = Namespace::pattern("fixme").unwrap();
        cache.put(&todo, a(), b"[1]");
        cache.put(&fixme, a(), b"[2]");

        assert_eq!(cache.clear(&ClearTarget::Pattern("todo".to_string())), 1);
        assert!(cache.get(&todo, a()).is_none());
        assert!(cache.get(&fixme, a()).is_some());
    }

    #[test]
    fn optimize_age_boundary() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        let before = SystemTime::now();
        cache.put(&Namespace::Parse, a(), b"tree");
        let after = SystemTime::now();

        let max_age = Duration::from_secs(7 * 24 * 3600);
        let epsilon = Duration::from_secs(1);
        assert_eq!(cache.optimize_at(max_age, before + max_age - epsilon), 0);
        assert!(cache.get(&Namespace::Parse, a()).is_some());

        assert_eq!(cache.optimize_at(max_age, after + max_age + epsilon), 1);
        assert!(cache.is_fresh(a()), "optimize leaves the index alone");
        assert!(cache.get(&Namespace::Parse, a()).is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn optimize_removes_unreadable_blobs() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.cache_dir().join("analysis")).unwrap();
        std::fs::write(fx.cache_dir().join("analysis/junk@analysis@0.blob"), b"??").unwrap();
        let mut cache = fx.open();
        assert_eq!(cache.optimize(Duration::from_secs(3600)), 1);
    }

    #[test]
    fn stats_survive_reopen() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        {
            let mut cache = fx.open();
            cache.get(&Namespace::Parse, a());
            cache.put(&Namespace::Parse, a(), b"tree");
            cache.get(&Namespace::Parse, a());
        }
        let mut cache = fx.open();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
        assert_eq!(cache.get(&Namespace::Parse, a()).as_deref(), Some(&b"tree"[..]));
    }

    #[test]
    fn corrupt_index_starts_cold() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        {
            let mut cache = fx.open();
            cache.put(&Namespace::Parse, a(), b"tree");
        }
        std::fs::write(CacheIndex::path(&fx.cache_dir()), "{ truncated").unwrap();

        let mut cache = fx.open();
        assert!(cache.tracked_files().is_empty());
        assert_eq!(cache.stats().writes, 0);
        assert!(cache.get(&Namespace::Parse, a()).is_none());
        assert!(fx
            .log
            .events()
            .iter()
            .any(|e| matches!(e, CacheEvent::IndexReset { .. })));
    }

    #[test]
    fn incompatible_index_starts_cold() {
        let fx = Fixture::new();
        let mut index = CacheIndex::new();
        index.version = INDEX_VERSION + 1;
        index.record("a.py", ContentHash::from_bytes(b"x"));
        index.save(&fx.cache_dir()).unwrap();

        let cache = fx.open();
        assert!(cache.tracked_files().is_empty());
    }

    #[test]
    fn cache_root_deleted_underneath() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"tree");
        std::fs::remove_dir_all(fx.cache_dir()).unwrap();

        assert!(cache.get(&Namespace::Parse, a()).is_none());
        assert_eq!(cache.clear(&ClearTarget::Kind(NamespaceKind::Parse)), 0);
        cache.put(&Namespace::Parse, a(), b"again");
        assert_eq!(cache.get(&Namespace::Parse, a()).as_deref(), Some(&b"again"[..]));
    }

    #[test]
    fn disabled_cache_is_inert() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        let mut cache = Cache::open(
            CacheOptions::new(fx.cache_dir(), fx.root())
                .enabled(false)
                .sink(fx.log.clone()),
        );
        cache.put(&Namespace::Parse, a(), b"tree");
        assert!(cache.get(&Namespace::Parse, a()).is_none());
        assert_eq!(cache.stats().misses, 0);
        drop(cache);
        assert!(!fx.cache_dir().exists());
    }

    #[test]
    fn absolute_and_relative_paths_share_entries() {
        let fx = Fixture::new();
        fx.write("src/a.py", "x = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, &fx.root().join("src/a.py"), b"tree");
        assert!(cache.get(&Namespace::Parse, Path::new("src/a.py")).is_some());
        assert_eq!(cache.tracked_files()[0].0, "src/a.py");
    }

    #[test]
    fn derive_key_tracks_content() {
        let fx = Fixture::new();
        fx.write("a.py", "one");
        let cache = fx.open();
        let k1 = cache.derive_key(a(), &Namespace::Parse);
        assert_eq!(k1, cache.derive_key(a(), &Namespace::Parse));
        fx.write("a.py", "two");
        assert_ne!(k1, cache.derive_key(a(), &Namespace::Parse));
    }

    #[test]
    fn record_and_forget() {
        let fx = Fixture::new();
        fx.write("a.py", "x");
        let mut cache = fx.open();
        let digest = cache.digest(a()).known().unwrap();
        cache.record(a(), digest);
        assert!(cache.is_fresh(a()));
        assert!(cache.forget(a()));
        assert!(!cache.is_fresh(a()));
        assert!(!cache.forget(a()));
    }

    #[test]
    fn detect_changes_across_edits() {
        let fx = Fixture::new();
        fx.write("a.py", "a");
        fx.write("b.py", "b");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"ta");
        cache.put(&Namespace::Parse, Path::new("b.py"), b"tb");
        fx.write("a.py", "a2");
        fx.write("c.py", "c");
        std::fs::remove_file(fx.root().join("b.py")).unwrap();

        let cs = cache.detect_changes(&[
            PathBuf::from("a.py"),
            PathBuf::from("b.py"),
            PathBuf::from("c.py"),
        ]);
        assert_eq!(cs.modified_files, vec!["a.py"]);
        assert_eq!(cs.deleted_files, vec!["b.py"]);
        assert_eq!(cs.new_files, vec!["c.py"]);
    }

    #[test]
    fn report_counts_entries_and_patterns() {
        let fx = Fixture::new();
        fx.write("a.py", "x = 1\n");
        fx.write("b.py", "y = 1\n");
        let mut cache = fx.open();
        cache.put(&Namespace::Parse, a(), b"tree a");
        cache.put(&Namespace::Parse, Path::new("b.py"), b"tree b");
        cache.put(&Namespace::pattern("todo").unwrap(), a(), b"[]");

        let report = cache.report();
        let parse = &report.namespaces[0];
        assert_eq!((parse.name.as_str(), parse.entries), ("parse", 2));
        assert!(parse.bytes > 0);
        assert_eq!(report.namespaces[1].entries, 1);
        assert_eq!(report.namespaces[2].entries, 0);
        assert_eq!(report.patterns.len(), 1);
        assert_eq!(report.patterns[0].name, "pattern:todo");
        assert_eq!(report.tracked_files, 2);
        assert!(report.total_bytes > parse.bytes);
    }
}
