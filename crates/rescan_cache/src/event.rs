//! Observable cache events.
//!
//! The cache never raises on its read/write path. Instead every decision
//! (hit, miss and why, store, failure, removal) is handed to an [`EventSink`]
//! supplied by the caller. [`TracingSink`] forwards events to `tracing`;
//! [`EventLog`] accumulates them in memory.

use std::path::PathBuf;
use std::sync::Mutex;

/// Why a lookup did not produce a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// Caching is disabled by configuration.
    Disabled,
    /// The file has no index record.
    Untracked,
    /// The file's digest differs from the recorded one.
    Changed,
    /// The file could not be read.
    Unreadable,
    /// The file is fresh but this namespace has no entry for it.
    NotStored,
    /// The entry exists but could not be read or validated.
    Corrupt,
    /// The entry was written with a different payload schema.
    SchemaMismatch,
}

/// Something the cache did or decided.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
    /// A lookup returned a payload.
    Hit {
        /// Namespace label.
        namespace: String,
        /// Normalized file path.
        path: String,
    },
    /// A lookup returned nothing.
    Miss {
        /// Namespace label.
        namespace: String,
        /// Normalized file path.
        path: String,
        /// Why.
        reason: MissReason,
    },
    /// A payload was written.
    Stored {
        /// Namespace label.
        namespace: String,
        /// Normalized file path.
        path: String,
        /// Key the payload was stored under.
        key: String,
    },
    /// A payload could not be written; the caller's result is simply not cached.
    StoreFailed {
        /// Namespace label.
        namespace: String,
        /// Normalized file path.
        path: String,
        /// Failure description.
        error: String,
    },
    /// A blob file was unreadable or failed validation.
    Corrupt {
        /// The blob file.
        path: PathBuf,
        /// Failure description.
        error: String,
    },
    /// The index was discarded and the cache started cold.
    IndexReset {
        /// Why the previous index was unusable.
        reason: String,
    },
    /// The index could not be written.
    IndexSaveFailed {
        /// Failure description.
        error: String,
    },
    /// A file could not be removed during maintenance.
    RemoveFailed {
        /// The file.
        path: PathBuf,
        /// Failure description.
        error: String,
    },
    /// Maintenance removed entries.
    Removed {
        /// The operation and its target, e.g. `"clear all"`.
        scope: String,
        /// Number of entries removed.
        count: usize,
    },
}

/// Receives cache events.
pub trait EventSink: Send + Sync {
    /// Handles one event.
    fn emit(&self, event: &CacheEvent);
}

/// Forwards events to `tracing` under the `rescan.cache` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &CacheEvent) {
        match event {
            CacheEvent::Hit { namespace, path } => {
                tracing::trace!(target: "rescan.cache", %namespace, %path, "cache hit");
            }
            CacheEvent::Miss {
                namespace,
                path,
                reason,
            } => {
                tracing::trace!(target: "rescan.cache", %namespace, %path, ?reason, "cache miss");
            }
            CacheEvent::Stored {
                namespace,
                path,
                key,
            } => {
                tracing::trace!(target: "rescan.cache", %namespace, %path, %key, "cache store");
            }
            CacheEvent::StoreFailed {
                namespace,
                path,
                error,
            } => {
                tracing::debug!(
                    target: "rescan.cache",
                    %namespace,
                    %path,
                    %error,
                    "failed to store cache entry"
                );
            }
            CacheEvent::Corrupt { path, error } => {
                tracing::debug!(
                    target: "rescan.cache",
                    path = %path.display(),
                    %error,
                    "ignoring unreadable cache entry"
                );
            }
            CacheEvent::IndexReset { reason } => {
                tracing::warn!(target: "rescan.cache", %reason, "cache index reset");
            }
            CacheEvent::IndexSaveFailed { error } => {
                tracing::warn!(target: "rescan.cache", %error, "failed to save cache index");
            }
            CacheEvent::RemoveFailed { path, error } => {
                tracing::debug!(
                    target: "rescan.cache",
                    path = %path.display(),
                    %error,
                    "failed to remove cache file"
                );
            }
            CacheEvent::Removed { scope, count } => {
                tracing::debug!(target: "rescan.cache", %scope, count, "removed cache entries");
            }
        }
    }
}

/// A thread-safe accumulator for cache events.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<CacheEvent>>,
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all events recorded so far.
    pub fn events(&self) -> Vec<CacheEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Takes all recorded events, leaving the log empty.
    pub fn take_all(&self) -> Vec<CacheEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: &CacheEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
