//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the game-data API key) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub watch: WatchSettings,
    pub providers: ProvidersConfig,
    pub storage: StorageConfig,
}

/// Timing and balance knobs shared by every watcher.
#[derive(Debug, Deserialize, Clone)]
pub struct WatchSettings {
    pub scan_interval_secs: u64,
    pub resolve_interval_secs: u64,
    pub scan_batch_size: usize,
    pub resolve_batch_size: usize,
    /// Seconds after match start during which betting stays open.
    pub lock_threshold_secs: i64,
    /// Balance seeded for a user's first interaction.
    pub start_balance: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    pub base_url: String,
    pub api_key_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
