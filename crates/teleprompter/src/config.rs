//! CLI configuration (`~/.config/teleprompter/config.toml`).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use teleprompter_core::config::SyncConfig;
use teleprompter_core::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the persisted settings files
    pub store_dir: PathBuf,

    /// Channel, relay and storage key settings
    pub sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        let store_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("teleprompter");

        Self {
            store_dir,
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    /// Get the config file path (~/.config/teleprompter/config.toml)
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("teleprompter").join("config.toml"))
    }

    /// Load config from the default path, or return default if the file doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load config from `path`, or return default if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Write config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }
}
