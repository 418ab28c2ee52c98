//! Configuration types deserialized from `rescan.toml`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default cache directory name, relative to the project root.
pub const DEFAULT_CACHE_DIR: &str = ".rescan_cache";

/// Default maximum entry age used by `cache optimize`.
pub const DEFAULT_MAX_AGE_DAYS: u64 = 30;

/// The top-level project configuration parsed from `rescan.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectConfig {
    /// Analysis cache settings.
    #[serde(default)]
    pub cache: CacheSettings,
    /// Logging settings.
    #[serde(default)]
    pub log: LogSettings,
}

/// The `[cache]` section.
#[derive(Debug, Deserialize)]
pub struct CacheSettings {
    /// Cache root directory. Relative paths are resolved against the project root.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
    /// Entries older than this many days are removed by `cache optimize`.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u64,
    /// When `false`, lookups always miss and writes are skipped.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_age_days: default_max_age_days(),
            enabled: default_enabled(),
        }
    }
}

impl CacheSettings {
    /// Resolves the cache root directory against `project_root`.
    pub fn cache_dir(&self, project_root: &Path) -> PathBuf {
        let dir = Path::new(&self.dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            project_root.join(dir)
        }
    }
}

/// The `[log]` section.
#[derive(Debug, Deserialize)]
pub struct LogSettings {
    /// Default log filter directive (e.g. `"warn"`, `"rescan=debug"`).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_cache_dir() -> String {
    DEFAULT_CACHE_DIR.to_string()
}

fn default_max_age_days() -> u64 {
    DEFAULT_MAX_AGE_DAYS
}

fn default_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}
