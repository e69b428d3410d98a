//! Upload configuration.
//!
//! Stored as JSON at `~/.config/blockput/config.json` by default; every
//! field is optional in the file and falls back to the built-in default.
//! A handful of `BLOCKPUT_*` environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use blockput_protocol::constants::{
    BLOCK_SIZE, DEFAULT_CHUNK_SIZE, DEFAULT_RETRY_MAX, DEFAULT_UP_HOST, DEFAULT_UP_HOST_BACKUP,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Tunables shared by every session of a process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub up_host: String,
    pub up_host_backup: String,
    pub block_size: u64,
    pub chunk_size: u64,
    pub retry_max: u32,
    pub timeout_secs: u64,
    pub pool_idle_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorder_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            up_host: DEFAULT_UP_HOST.into(),
            up_host_backup: DEFAULT_UP_HOST_BACKUP.into(),
            block_size: BLOCK_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_max: DEFAULT_RETRY_MAX,
            timeout_secs: 60,
            pool_idle_timeout_secs: 180,
            recorder_dir: None,
        }
    }
}

impl UploadConfig {
    /// Loads a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Applies `BLOCKPUT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("BLOCKPUT_UP_HOST").filter(|v| !v.is_empty()) {
            self.up_host = host;
        }
        if let Some(host) = var("BLOCKPUT_UP_HOST_BACKUP").filter(|v| !v.is_empty()) {
            self.up_host_backup = host;
        }
        if let Some(raw) = var("BLOCKPUT_CHUNK_SIZE") {
            match raw.parse() {
                Ok(size) => self.chunk_size = size,
                Err(_) => warn!(value = %raw, "ignoring invalid BLOCKPUT_CHUNK_SIZE"),
            }
        }
        if let Some(raw) = var("BLOCKPUT_RETRY_MAX") {
            match raw.parse() {
                Ok(n) => self.retry_max = n,
                Err(_) => warn!(value = %raw, "ignoring invalid BLOCKPUT_RETRY_MAX"),
            }
        }
        if let Some(dir) = var("BLOCKPUT_RECORDER_DIR").filter(|v| !v.is_empty()) {
            self.recorder_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.up_host.trim().is_empty() {
            return Err(invalid("up_host", "must not be empty"));
        }
        if self.up_host_backup.trim().is_empty() {
            return Err(invalid("up_host_backup", "must not be empty"));
        }
        if self.block_size != BLOCK_SIZE {
            return Err(invalid(
                "block_size",
                format!("must be {BLOCK_SIZE}, the server's block size"),
            ));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", "must be non-zero"));
        }
        if self.chunk_size > self.block_size {
            return Err(invalid(
                "chunk_size",
                format!("{} exceeds block size {}", self.chunk_size, self.block_size),
            ));
        }
        if self.block_size % self.chunk_size != 0 {
            return Err(invalid(
                "block_size",
                format!(
                    "{} is not a multiple of chunk size {}",
                    self.block_size, self.chunk_size
                ),
            ));
        }
        if usize::try_from(self.chunk_size).is_err() {
            return Err(invalid("chunk_size", "does not fit in memory"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Default config file: `blockput/config.json` under the platform config dir.
pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("blockput").join("config.json"))
}

/// Default checkpoint directory: `blockput/records` under the platform config dir.
pub fn default_recorder_dir() -> Option<PathBuf> {
    config_dir().map(|d| d.join("blockput").join("records"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
