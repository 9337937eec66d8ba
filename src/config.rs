//! Configuration loading
//!
//! Looked up in order: explicit path, `LEAD_PIPELINE_CONFIG`, then
//! `$XDG_CONFIG_HOME/lead-pipeline/config.toml`. A missing file means defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::intake::IntakePolicy;

const APP_DIR: &str = "lead-pipeline";

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(dirs::config_dir)
        .unwrap_or_else(|| PathBuf::from(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| PathBuf::from(".local/share"))
}

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub brand: BrandConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub intake: IntakePolicy,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct BrandConfig {
    /// Shown as the owner of every lead
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct StorageConfig {
    /// Directory for the file-backed store
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_file")]
    pub file_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            file_name: default_export_file(),
        }
    }
}

fn default_export_file() -> String {
    "crm-leads.csv".to_string()
}

impl Config {
    /// Load from `path` if given, otherwise from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => std::env::var("LEAD_PIPELINE_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| Self::config_path()),
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn config_path() -> PathBuf {
        xdg_config_home().join(APP_DIR).join("config.toml")
    }

    /// Configured data directory or `$XDG_DATA_HOME/lead-pipeline`.
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| xdg_data_home().join(APP_DIR))
    }
}
