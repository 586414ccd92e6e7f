//! Console configuration
//!
//! Loaded from an optional TOML file; `AUTOHEAL_API_BASE` overrides the
//! backend address, and CLI flags override both.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable that overrides `api_base`
pub const API_BASE_ENV: &str = "AUTOHEAL_API_BASE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for the console
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsoleConfig {
    /// Base URL of the healing backend
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Timeout for run submission and result retrieval (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Connect timeout for every request, the log stream included (seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Where exported results are written
    #[serde(default = "default_export_path")]
    pub export_path: PathBuf,

    /// "error", "warn", "info", "debug" or "trace"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_base() -> String { "http://localhost:5000".to_string() }
fn default_request_timeout_secs() -> u64 { 30 }
fn default_connect_timeout_secs() -> u64 { 10 }
fn default_export_path() -> PathBuf { PathBuf::from("healing_result.json") }
fn default_log_level() -> String { "info".to_string() }

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            export_path: default_export_path(),
            log_level: default_log_level(),
        }
    }
}

impl ConsoleConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let mut config: ConsoleConfig = toml::from_str(contents)?;
        config.api_base = normalize_base(&config.api_base);
        Ok(config)
    }

    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let contents =
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Self::from_toml_str(&contents)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply an `AUTOHEAL_API_BASE` value, if any
    pub fn with_env_override(mut self, api_base: Option<String>) -> Self {
        if let Some(base) = api_base.filter(|b| !b.trim().is_empty()) {
            self.api_base = normalize_base(&base);
        }
        self
    }

    /// Read `AUTOHEAL_API_BASE` from the process environment
    pub fn with_process_env(self) -> Self {
        self.with_env_override(std::env::var(API_BASE_ENV).ok())
    }

    pub fn with_api_base(mut self, api_base: impl AsRef<str>) -> Self {
        self.api_base = normalize_base(api_base.as_ref());
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn normalize_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}
