//! Client config load/save for `~/.kms-stream/config.yaml`.
//! Every field is optional; unset fields fall back to the defaults below.

use std::path::{Path, PathBuf};

use crate::decoder::DEFAULT_RESCUE_MIN_LEN;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:19001/chat/query";
pub const DEFAULT_USERNAME: &str = "admin";
/// Asks the service to format its answer as Markdown.
pub const DEFAULT_PROMPT_SUFFIX: &str = " 마크다운 형식으로 알려줘";

/// Env var that overrides the config file location.
pub const CONFIG_ENV: &str = "KMS_STREAM_CONFIG";

/// API section (url, username).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ApiSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Stream section (mode, prompt suffix, rescue threshold).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StreamSection {
    /// `false` sends single-shot queries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_suffix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescue_min_len: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub stream: StreamSection,
}

impl Config {
    pub fn api_url(&self) -> &str {
        self.api.url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn username(&self) -> &str {
        self.api.username.as_deref().unwrap_or(DEFAULT_USERNAME)
    }

    pub fn streaming(&self) -> bool {
        self.stream.enabled.unwrap_or(true)
    }

    pub fn prompt_suffix(&self) -> &str {
        self.stream
            .prompt_suffix
            .as_deref()
            .unwrap_or(DEFAULT_PROMPT_SUFFIX)
    }

    pub fn rescue_min_len(&self) -> usize {
        self.stream.rescue_min_len.unwrap_or(DEFAULT_RESCUE_MIN_LEN)
    }
}

/// Returns the default config file path: `~/.kms-stream/config.yaml` (platform-specific).
pub fn default_config_path() -> Option<PathBuf> {
    let home = home_dir()?;
    Some(home.join(".kms-stream").join("config.yaml"))
}

/// `--config` value, else `KMS_STREAM_CONFIG`, else the default path.
pub fn resolve_config_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = override_path {
        return Some(p.to_path_buf());
    }
    if let Some(val) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(val));
    }
    default_config_path()
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

/// Load config, or defaults when the file does not exist.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        load(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(Config::default())
    }
}

/// Save config to a YAML file. Creates parent directory if missing.
pub fn save(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Config load/save error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
