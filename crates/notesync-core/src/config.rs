//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/notesync/config.toml)
//! 3. Environment variables (NOTESYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::ConnectionConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "NOTESYNC";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the notes HTTP API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Push channel URL; derived from `api_url` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,

    /// Inactivity window for coalesced edits
    #[serde(default = "default_edit_debounce_ms")]
    pub edit_debounce_ms: u64,

    /// Wait between a push channel close and the next attempt
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: None,
            edit_debounce_ms: default_edit_debounce_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (NOTESYNC_API_URL, NOTESYNC_WS_URL, ...)
    /// 2. Config file (~/.config/notesync/config.toml or NOTESYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(val) = env_var("API_URL") {
            self.api_url = val;
        }

        // Empty string clears it
        if let Some(val) = env_var("WS_URL") {
            self.ws_url = if val.is_empty() { None } else { Some(val) };
        }

        if let Some(val) = env_var("EDIT_DEBOUNCE_MS") {
            self.edit_debounce_ms = parse_millis("EDIT_DEBOUNCE_MS", &val)?;
        }

        if let Some(val) = env_var("RECONNECT_DELAY_MS") {
            self.reconnect_delay_ms = parse_millis("RECONNECT_DELAY_MS", &val)?;
        }

        Ok(())
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with NOTESYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Some(path) = env_var("CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notesync")
            .join("config.toml")
    }

    /// Effective push channel URL
    pub fn push_url(&self) -> String {
        match &self.ws_url {
            Some(url) => url.clone(),
            None => derive_ws_url(&self.api_url),
        }
    }

    pub fn edit_window(&self) -> Duration {
        Duration::from_millis(self.edit_debounce_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Settings for the push connection task
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.push_url(),
            reconnect_delay: self.reconnect_delay(),
        }
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, suffix)).ok()
}

fn parse_millis(suffix: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid {}_{}: {:?}", ENV_PREFIX, suffix, value))
}

/// `http://host` becomes `ws://host/ws`, `https` becomes `wss`
fn derive_ws_url(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/ws", base)
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_edit_debounce_ms() -> u64 {
    1500
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}
