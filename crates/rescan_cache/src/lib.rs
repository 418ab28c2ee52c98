//! Content-addressed result cache for per-file static analysis.
//!
//! Memoizes parse results, pattern-match hit lists and analysis summaries
//! across tool invocations, and treats a memoized result as gone the moment
//! the bytes of its source file change. Payloads are opaque byte strings; a
//! [`Codec`] turns them into typed values when the caller wants that.
//!
//! Every failure on the read/write path degrades to "not cached" and is
//! reported through an [`EventSink`] rather than returned to the caller.

#![warn(missing_docs)]

pub mod artifact;
pub mod cache;
pub mod codec;
pub mod error;
pub mod event;
mod fsutil;
pub mod identity;
pub mod index;
pub mod key;
pub mod namespace;
pub mod stats;

pub use cache::{Cache, CacheOptions, CacheReport, NamespaceUsage};
pub use codec::{BincodeCodec, Codec, JsonCodec};
pub use error::CacheError;
pub use event::{CacheEvent, EventLog, EventSink, MissReason, TracingSink};
pub use identity::{ChangeSet, FileDigest, SourceHasher};
pub use key::{CacheKey, KeyDeriver};
pub use namespace::{ClearTarget, Namespace, NamespaceKind};
pub use stats::{Statistics, StatsSnapshot};
