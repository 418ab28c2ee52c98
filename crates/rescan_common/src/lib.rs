//! Shared foundational types used across the rescan toolkit.
//!
//! Currently this is the content hash used to decide whether a source file
//! still has the bytes it had when its analysis results were cached.

#![warn(missing_docs)]

pub mod hash;

pub use hash::{ContentHash, ParseHashError};
