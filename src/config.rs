// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Client configuration.
//!
//! Stored as JSON in `~/.tubeshelf/config.json`. Missing fields fall back to
//! defaults, and `TUBESHELF_API_URL` overrides the backend address.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::DEFAULT_SEARCH_LIMIT;

/// Environment variable overriding [`ClientConfig::api_url`].
pub const API_URL_ENV: &str = "TUBESHELF_API_URL";

/// Default backend address.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Lower bound for the poll cadence.
const MIN_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base address of the backend API, including the `/api` prefix.
    pub api_url: String,
    /// Timeout applied to every backend call.
    pub request_timeout_secs: u64,
    /// Cadence of download status polls.
    pub poll_interval_ms: u64,
    /// How long a completed download stays visible before the form closes.
    pub completion_delay_ms: u64,
    /// Result bound for library listings.
    pub search_limit: u32,
    /// Consecutive transport failures tolerated while polling.
    pub max_poll_failures: u32,
    /// Scan subdirectories of the media path.
    pub scan_recursive: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 30,
            poll_interval_ms: 1000,
            completion_delay_ms: 2000,
            search_limit: DEFAULT_SEARCH_LIMIT,
            max_poll_failures: 30,
            scan_recursive: true,
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_millis(self.completion_delay_ms)
    }

    /// Replace the API address when an override is given. Blank overrides are ignored.
    pub fn with_api_url_override(mut self, api_url: Option<String>) -> Self {
        if let Some(url) = api_url {
            let url = url.trim();
            if !url.is_empty() {
                self.api_url = url.trim_end_matches('/').to_string();
            }
        }
        self
    }

    /// Apply `TUBESHELF_API_URL` if set.
    pub fn apply_env(self) -> Self {
        let url = std::env::var(API_URL_ENV).ok();
        self.with_api_url_override(url)
    }
}

/// Directory holding the config file.
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".tubeshelf"))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// Load the config from the default location, then apply the environment.
pub fn load_config() -> Result<ClientConfig> {
    let config = load_config_from(&config_path()?)?;
    Ok(config.apply_env())
}

/// Load the config from `path`, returning defaults if the file does not exist.
pub fn load_config_from(path: &Path) -> Result<ClientConfig> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid config file {:?}", path))
}

pub fn save_config(config: &ClientConfig) -> Result<()> {
    save_config_to(&config_path()?, config)
}

pub fn save_config_to(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {:?}", parent))?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).with_context(|| format!("Failed to write config file {:?}", path))?;
    Ok(())
}
