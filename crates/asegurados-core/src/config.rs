//! Application configuration management.
//!
//! Configuration is stored at `~/.config/asegurados/config.json`. Environment
//! variables override what the file says.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::offline::DEFAULT_GENERATION;

/// Application name used for config/data directory paths
const APP_NAME: &str = "asegurados";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Where the app and its dataset are served from when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";

/// Dataset path, relative to the base URL
const DATASET_FILE: &str = "data.json";

pub const ENV_BASE_URL: &str = "ASEGURADOS_BASE_URL";
pub const ENV_DATA_DIR: &str = "ASEGURADOS_DATA_DIR";
pub const ENV_CACHE_GENERATION: &str = "ASEGURADOS_CACHE_GENERATION";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub base_url: Option<String>,
    pub cache_generation: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Config file merged with the process environment.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_from(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Override fields from `lookup`. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v: &String| !v.trim().is_empty());

        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.base_url = Some(url);
        }
        if let Some(dir) = non_empty(ENV_DATA_DIR) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(generation) = non_empty(ENV_CACHE_GENERATION) {
            self.cache_generation = Some(generation);
        }
    }

    /// Base URL of the app. Always ends in `/` so relative assets resolve beneath it.
    pub fn base_url(&self) -> Result<Url> {
        let raw = self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL).trim();
        let mut url = Url::parse(raw).with_context(|| format!("Invalid base URL: {}", raw))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    pub fn dataset_url(&self) -> Result<Url> {
        Ok(self.base_url()?.join(DATASET_FILE)?)
    }

    pub fn generation(&self) -> String {
        self.cache_generation
            .clone()
            .unwrap_or_else(|| DEFAULT_GENERATION.to_string())
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Offline cache stores live beside the roster data.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("cache"))
    }
}
