//! Client config load/save for `~/.legal-qa/config.yaml`.
//! The `LEGAL_QA_API_URL` environment variable overrides `api.base_url`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::messages::DEFAULT_MAX_RESULTS;

/// Environment variable holding the answering service base URL.
pub const API_URL_ENV: &str = "LEGAL_QA_API_URL";

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "LEGAL_QA_CONFIG";

/// API section (base_url, connect_timeout_secs).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

/// Query section (max_results).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuerySection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub query: QuerySection,
}

impl Config {
    /// Base URL from `LEGAL_QA_API_URL`, falling back to `api.base_url`.
    pub fn resolve_base_url(&self) -> Result<String, ConfigError> {
        let from_env = std::env::var(API_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty());
        from_env
            .or_else(|| self.api.base_url.clone())
            .ok_or(ConfigError::MissingBaseUrl)
    }

    pub fn max_results(&self) -> u32 {
        self.query.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.api.connect_timeout_secs.map(Duration::from_secs)
    }
}

/// Returns the default config file path: `~/.legal-qa/config.yaml` (platform-specific).
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".legal-qa").join("config.yaml"))
}

#[cfg(unix)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

#[cfg(windows)]
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE").map(PathBuf::from)
}

#[cfg(not(any(unix, windows)))]
fn home_dir() -> Option<PathBuf> {
    None
}

/// Load config from a YAML file.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Like `load`, but a missing file yields the default config.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    match load(path) {
        Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Ok(Config::default())
        }
        other => other,
    }
}

/// Save config to a YAML file. Creates parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("no service URL configured (set LEGAL_QA_API_URL or api.base_url)")]
    MissingBaseUrl,
}
