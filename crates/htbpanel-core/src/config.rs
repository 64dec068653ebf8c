//! Configuration resolution for htbpanel.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config_dir>/htbpanel/settings.json`)
//! 3. Project config (`.htbpanel/settings.json`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "HTB_KEY";

/// Complete htbpanel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            sync: SyncConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// File read for the token when `HTB_KEY` is unset.
    pub token_file: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://labs.hackthebox.com/api/v4".to_string(),
            timeout_secs: 30,
            user_agent: format!("htbpanel/{}", env!("CARGO_PKG_VERSION")),
            token_file: PathBuf::from(".api"),
        }
    }
}

/// Local store settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: Option<PathBuf>,
}

/// Pacing for bulk catalog downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub page_size: u32,
    /// Pause between paginated or per-machine requests.
    pub request_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            request_delay_ms: 2500,
        }
    }
}

impl Config {
    /// Database location: configured path, else the per-user default.
    pub fn database_path(&self) -> Result<PathBuf> {
        self.storage
            .database_path
            .clone()
            .or_else(default_database_path)
            .ok_or_else(|| Error::Config("Cannot determine database location".into()))
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(project_dir: Option<&Path>) -> Result<Config> {
    let mut files = Vec::new();
    if let Some(global_path) = global_config_path() {
        files.push(global_path);
    }
    if let Some(dir) = project_dir {
        files.push(dir.join(".htbpanel").join("settings.json"));
    }

    let mut config = layered_config(&files)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Defaults overlaid by each existing file in order. Only keys present in a
/// file override earlier layers.
fn layered_config(files: &[PathBuf]) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;
    for path in files.iter().filter(|p| p.exists()) {
        merge_json(&mut merged, load_config_file(path)?);
    }
    Ok(serde_json::from_value(merged)?)
}

/// `<config_dir>/htbpanel`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("htbpanel"))
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("settings.json"))
}

/// Default location of the catalog cache.
pub fn default_database_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("htb.db"))
}

/// Resolve the API token from `HTB_KEY`, falling back to the token file.
pub fn resolve_token(config: &Config) -> Result<String> {
    resolve_token_from(std::env::var(TOKEN_ENV).ok(), &config.api.token_file)
}

/// Token resolution with the environment value passed in.
pub fn resolve_token_from(env_value: Option<String>, token_file: &Path) -> Result<String> {
    if let Some(token) = env_value.map(|t| t.trim().to_string()) {
        if !token.is_empty() {
            return Ok(token);
        }
    }

    let content = std::fs::read_to_string(token_file).map_err(|e| {
        Error::Config(format!(
            "{TOKEN_ENV} unset and token file {} unreadable: {e}",
            token_file.display()
        ))
    })?;
    let token = content.trim();
    if token.is_empty() {
        return Err(Error::Config(format!(
            "Token file {} is empty",
            token_file.display()
        )));
    }
    Ok(token.to_string())
}

fn load_config_file(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_json(base: &mut serde_json::Value, overlay: serde_json::Value) {
    match (base, overlay) {
        (serde_json::Value::Object(base), serde_json::Value::Object(overlay)) => {
            for (key, value) in overlay {
                merge_json(base.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("HTBPANEL_API_URL") {
        config.api.base_url = val;
    }
    if let Some(val) = var("HTBPANEL_DB_PATH") {
        config.storage.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("HTBPANEL_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Some(val) = var("HTBPANEL_REQUEST_DELAY_MS") {
        if let Ok(n) = val.parse() {
            config.sync.request_delay_ms = n;
        }
    }
}
