//! Parsing and validation of `rescan.toml` project configuration files.
//!
//! This crate reads the project configuration file and produces a strongly-typed
//! [`ProjectConfig`] describing where the analysis cache lives and how it is
//! maintained.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{find_project_root, load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
