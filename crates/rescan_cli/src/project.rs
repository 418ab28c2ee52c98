//! Project root resolution and cache construction shared by commands.

use std::path::{Path, PathBuf};

use rescan_cache::{Cache, CacheOptions};
use rescan_config::{ProjectConfig, CONFIG_FILE};

use crate::GlobalArgs;

/// A resolved project: its root directory and loaded configuration.
#[derive(Debug)]
pub struct Project {
    /// Directory cache keys are relative to.
    pub root: PathBuf,
    /// Configuration from `rescan.toml`, or the defaults.
    pub config: ProjectConfig,
}

impl Project {
    /// Resolves the project from global CLI args.
    ///
    /// With `--config`, a file is loaded directly and its directory becomes
    /// the root; a directory is the root itself. Otherwise the nearest
    /// ancestor of the current directory holding `rescan.toml` is used,
    /// falling back to the current directory with default settings.
    pub fn resolve(global: &GlobalArgs) -> Result<Self, Box<dyn std::error::Error>> {
        match global.config {
            Some(ref config_path) => Self::from_config_path(Path::new(config_path)),
            None => {
                let cwd = std::env::current_dir()?;
                let root = rescan_config::find_project_root(&cwd).unwrap_or(cwd);
                Self::at(root)
            }
        }
    }

    /// Loads the project rooted at `root`.
    pub fn at(root: PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let config = rescan_config::load_config(&root)?;
        Ok(Self { root, config })
    }

    fn from_config_path(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.is_file() {
            let content = std::fs::read_to_string(path)?;
            let config = rescan_config::load_config_from_str(&content)?;
            let root = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            Ok(Self { root, config })
        } else if path.is_dir() {
            Self::at(path.to_path_buf())
        } else {
            Err(format!(
                "config path {} is neither a {CONFIG_FILE} file nor a directory",
                path.display()
            )
            .into())
        }
    }

    /// The cache root directory.
    pub fn cache_dir(&self) -> PathBuf {
        self.config.cache.cache_dir(&self.root)
    }

    /// Opens the project's cache with events forwarded to `tracing`.
    pub fn open_cache(&self) -> Cache {
        Cache::open(
            CacheOptions::new(self.cache_dir(), &self.root).enabled(self.config.cache.enabled),
        )
    }
}
