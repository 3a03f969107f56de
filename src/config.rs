//! Configuration Management
//!
//! Harness-level settings for the `otcmod` binary. Cloud credentials are
//! not stored here; they come from `clouds.yaml` or the invocation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable pointing at an alternative config file
pub const CONFIG_ENV: &str = "OTCMOD_CONFIG";

fn default_poll_interval_ms() -> u64 {
    2000
}

/// Harness configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level used when `--log-level` is not given
    #[serde(default)]
    pub log_level: Option<String>,
    /// Log file, instead of the default under the config directory
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Delay between two status polls while waiting on a resource
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// clouds.yaml to read profiles from, before the standard locations
    #[serde(default)]
    pub clouds_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: None,
            log_file: None,
            poll_interval_ms: default_poll_interval_ms(),
            clouds_file: None,
        }
    }
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|p| p.join("otcmod").join("config.json"))
    }

    /// Load configuration from disk. A missing or unreadable file yields
    /// the defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content),
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> Self {
        serde_json::from_str(content).unwrap_or_default()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Log file (config > config dir > home > cwd)
    pub fn log_path(&self) -> PathBuf {
        if let Some(path) = &self.log_file {
            return path.clone();
        }
        if let Some(config_dir) = dirs::config_dir() {
            return config_dir.join("otcmod").join("otcmod.log");
        }
        if let Some(home) = dirs::home_dir() {
            return home.join(".otcmod").join("otcmod.log");
        }
        PathBuf::from("otcmod.log")
    }
}
