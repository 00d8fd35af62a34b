//! CLI configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tickertape_core::ClientConfig;

const CONFIG_FILE: &str = "tickertape.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Logging level, overridden by `RUST_LOG`.
    pub log_level: String,

    /// Device targeted by player commands; empty means the active device.
    pub device_id: String,

    /// Period of the `watch` loop.
    pub poll_interval_ms: u64,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    pub client: ClientConfig,

    pub credentials: CredentialsConfig,
}

/// `[credentials]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub client_id: String,
    pub client_secret: String,

    /// Used only when no token has been saved by `tickertape authorize`.
    pub refresh_token: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            device_id: String::new(),
            poll_interval_ms: 5000,
            config_path: PathBuf::new(),
            client: ClientConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

/// Load configuration from `path`, or from the default location.
///
/// A missing file at the default location yields defaults; a missing file
/// that was asked for explicitly is an error.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => load_from_path(path),
        None => {
            let path = default_config_path();
            if path.exists() {
                load_from_path(&path)
            } else {
                Ok(AppConfig {
                    config_path: path,
                    ..AppConfig::default()
                })
            }
        }
    }
}

pub fn load_from_path(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {:?}", path))?;
    let mut config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config from {:?}", path))?;
    config.config_path = path.to_path_buf();
    Ok(config)
}

pub fn default_config_path() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().join(CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "raibid-labs", "tickertape")
}
