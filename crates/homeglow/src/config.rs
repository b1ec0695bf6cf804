//! Runtime configuration for the HomeGlow binary.
//!
//! Settings come from an optional JSON file, with the two environment
//! knobs (`HOMEGLOW_PIPE`, `GOVEE_API_KEY`) taking precedence.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use homeglow_core::LogConfig;

/// Default location of the receiver's named pipe.
pub const DEFAULT_PIPE_PATH: &str = "/tmp/librespot-pipe";

/// Application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path of the PCM pipe written by the Spotify-Connect receiver.
    #[serde(default = "default_pipe_path")]
    pub pipe_path: PathBuf,
    /// Cloud API key for the fallback control path; empty disables it.
    #[serde(default)]
    pub cloud_api_key: String,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

fn default_pipe_path() -> PathBuf {
    PathBuf::from(DEFAULT_PIPE_PATH)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            pipe_path: default_pipe_path(),
            cloud_api_key: String::new(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load settings from `path` (when given), then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(pipe) = std::env::var("HOMEGLOW_PIPE") {
            if !pipe.is_empty() {
                config.pipe_path = PathBuf::from(pipe);
            }
        }
        if let Ok(key) = std::env::var("GOVEE_API_KEY") {
            if !key.is_empty() {
                config.cloud_api_key = key;
            }
        }

        Ok(config)
    }
}
