//! Engine configuration.
//!
//! Layered the usual way: built-in defaults, then an optional
//! `taskdeck/config.toml` under the platform config directory, then
//! environment variables (`TASKDECK_API_URL`, `TASKDECK_TIMEOUT_SECS`).
//! CLI flags override all three at the call site.
//!
//! ```toml
//! api_url = "https://tracker.example.com"
//! request_timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub api_base_url: String,
    pub request_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    api_url: Option<String>,
    request_timeout_secs: Option<u64>,
}

impl EngineConfig {
    /// Load with the standard layering. Missing config file is fine; a
    /// present-but-broken one is an error rather than a silent default.
    pub fn load() -> Result<Self> {
        let file = match Self::default_config_path() {
            Some(path) if path.exists() => read_config_file(&path)?,
            _ => ConfigFile::default(),
        };
        Ok(resolve(
            file,
            std::env::var("TASKDECK_API_URL").ok(),
            std::env::var("TASKDECK_TIMEOUT_SECS").ok(),
        ))
    }

    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskdeck").join("config.toml"))
    }

    /// Directory for CLI state (the persisted session cookie).
    pub fn state_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskdeck"))
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))
}

fn resolve(file: ConfigFile, env_url: Option<String>, env_timeout: Option<String>) -> EngineConfig {
    let defaults = EngineConfig::default();
    let api_base_url = env_url
        .or(file.api_url)
        .unwrap_or(defaults.api_base_url)
        .trim_end_matches('/')
        .to_string();
    let timeout_secs = env_timeout
        .and_then(|v| v.parse().ok())
        .or(file.request_timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    EngineConfig {
        api_base_url,
        request_timeout: Duration::from_secs(timeout_secs),
    }
}
