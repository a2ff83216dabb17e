//! Configuration resolution for Trellis.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/trellis/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete Trellis configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Garden server API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token sent with every request and on the event socket.
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:2337".to_string(),
            token: None,
            request_timeout_secs: 30,
        }
    }
}

/// Real-time event socket settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub path: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            path: "/api/v1/socket/events/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    pub json: bool,
}

/// A settings file as written on disk. Only the keys present override the
/// layers beneath it.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    api: ApiFile,
    events: EventsFile,
    log: LogFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiFile {
    base_url: Option<String>,
    token: Option<String>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventsFile {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LogFile {
    json: Option<bool>,
}

impl Config {
    /// Websocket URL of the event stream, derived from the API base URL.
    pub fn events_url(&self) -> Result<String> {
        let base = self.api.base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(Error::Config(format!(
                "API base URL must start with http:// or https://: {}",
                self.api.base_url
            )));
        };

        let mut url = format!("{ws_base}{}", self.events.path);
        if let Some(token) = self.api.token.as_deref().filter(|t| !t.is_empty()) {
            url.push_str("?token=");
            url.push_str(token);
        }
        Ok(url)
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path()
        && global_path.exists()
    {
        let global = load_config_file(&global_path)?;
        merge_config(&mut config, global);
    }

    if let Some(path) = explicit {
        let overlay = load_config_file(path)?;
        merge_config(&mut config, overlay);
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".trellis").join("settings.json"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/trellis/settings.json"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("trellis").join("settings.json"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

fn merge_config(base: &mut Config, overlay: ConfigFile) {
    if let Some(base_url) = overlay.api.base_url {
        base.api.base_url = base_url;
    }
    if overlay.api.token.is_some() {
        base.api.token = overlay.api.token;
    }
    if let Some(secs) = overlay.api.request_timeout_secs {
        base.api.request_timeout_secs = secs;
    }
    if let Some(path) = overlay.events.path {
        base.events.path = path;
    }
    if let Some(json) = overlay.log.json {
        base.log.json = json;
    }
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("TRELLIS_URL") {
        config.api.base_url = val;
    }
    if let Some(val) = var("TRELLIS_TOKEN") {
        config.api.token = Some(val);
    }
    if let Some(n) = var("TRELLIS_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.api.request_timeout_secs = n;
    }
    if let Some(val) = var("TRELLIS_LOG_JSON") {
        config.log.json = matches!(val.as_str(), "1" | "true" | "yes");
    }
}
