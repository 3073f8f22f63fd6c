//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API base URL, the last username used to log in, and where the
//! session credential is kept.
//!
//! Configuration is stored at `~/.config/budget-tool/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use budget_core::auth::{FileStorage, KeyringStorage, MemoryStorage};
use budget_core::SessionStore;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "budget-tool";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const API_BASE_URL_ENV: &str = "BUDGET_API_BASE_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

/// Where the session credential is persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Keyring,
    #[default]
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub last_username: Option<String>,
    #[serde(default)]
    pub storage: StorageKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            last_username: None,
            storage: StorageKind::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply an API base URL override, ignoring blank values
    pub fn apply_api_override(&mut self, value: Option<String>) {
        if let Some(url) = value.filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn log_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("logs"))
    }

    /// Build the session store over the configured credential slot
    pub fn session_store(&self, data_dir: PathBuf) -> SessionStore {
        match self.storage {
            StorageKind::Keyring => SessionStore::new(KeyringStorage::new()),
            StorageKind::File => SessionStore::new(FileStorage::new(data_dir)),
            StorageKind::Memory => SessionStore::new(MemoryStorage::new()),
        }
    }
}
