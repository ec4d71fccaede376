//! TOML file configuration.
//!
//! These structs directly map to the `betwitness-config.toml` file format.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub watch: WatchConfig,
    pub session: SessionConfig,
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Bet-history watching section.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Path to the compressed bet-history export.
    pub snapshot_path: PathBuf,

    /// Identity column used to pair rows across snapshots.
    #[serde(default = "default_key_column")]
    pub key_column: String,

    /// Seconds between comparison polls.
    #[serde(default = "default_watch_period")]
    pub period_secs: u64,
}

fn default_key_column() -> String {
    "BetId".to_owned()
}

fn default_watch_period() -> u64 {
    10
}

/// Login handshake section.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub login_url: String,
    pub username: String,
    pub password: String,

    /// Seconds between session refreshes.
    #[serde(default = "default_refresh_period")]
    pub refresh_period_secs: u64,
}

fn default_refresh_period() -> u64 {
    600
}

/// Remote delivery section.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Base URL of the placed-bets resource.
    pub endpoint: String,

    /// Event categories eligible for delivery; empty accepts everything.
    #[serde(default)]
    pub accepted_event_types: Vec<String>,
}

/// Scheduler section.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Resolution of the scheduler loop in milliseconds.
    #[serde(default = "default_tick")]
    pub tick_millis: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick(),
        }
    }
}

fn default_tick() -> u64 {
    500
}

impl FileConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
