//! Configuration file discovery, loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::{Path, PathBuf};

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "rescan.toml";

/// Walks up from `start` looking for the nearest directory containing `rescan.toml`.
///
/// Returns `None` if no ancestor has one.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(CONFIG_FILE).is_file() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Loads and validates the configuration for a project directory.
///
/// A missing `rescan.toml` is not an error: the defaults are returned.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        return Ok(ProjectConfig::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `rescan.toml` configuration from a string.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.cache.dir.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "cache.dir must not be empty".to_string(),
        ));
    }
    if config.cache.max_age_days == 0 {
        return Err(ConfigError::ValidationError(
            "cache.max_age_days must be positive".to_string(),
        ));
    }
    Ok(())
}
