//! Configuration management for monitor settings.
//!
//! Stores settings in JSON format at `~/.connwatch/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::models::ConnState;

/// Monitor settings stored in JSON format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Auto-refresh interval in seconds.
    #[serde(default = "default_refresh_interval", rename = "refreshInterval")]
    pub refresh_interval_secs: u64,

    /// How long new/changed row highlights stay visible, in milliseconds.
    #[serde(default = "default_change_highlight", rename = "changeHighlightMs")]
    pub change_highlight_ms: u64,

    /// Connection state treated as transient teardown during kill
    /// verification.
    #[serde(default = "default_transient_state", rename = "transientState")]
    pub transient_state: ConnState,
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_change_highlight() -> u64 {
    2000
}

fn default_transient_state() -> ConnState {
    ConnState::TimeWait
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            change_highlight_ms: default_change_highlight(),
            transient_state: default_transient_state(),
        }
    }
}

impl Settings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn change_highlight(&self) -> Duration {
        Duration::from_millis(self.change_highlight_ms)
    }
}

/// Configuration store handling reads and writes of the settings file.
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Create a config store with the default path
    /// (`~/.connwatch/config.json`).
    pub fn new() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
        Ok(Self {
            config_path: home.join(".connwatch").join("config.json"),
        })
    }

    /// Create a config store with a custom path (for testing).
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Load settings from disk, falling back to defaults when the file does
    /// not exist.
    pub async fn load(&self) -> Result<Settings> {
        if !self.config_path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Save settings to disk, creating the directory if needed.
    ///
    /// Writes go through a temp file followed by a rename so a crash never
    /// leaves a half-written config behind.
    pub async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(dir) = self.config_path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
            }
        }

        let content = serde_json::to_string_pretty(settings)?;
        let temp_path = self.config_path.with_extension("json.tmp");

        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to create temp config file: {}", e)))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| Error::Config(format!("Failed to sync config: {}", e)))?;

        fs::rename(&temp_path, &self.config_path)
            .await
            .map_err(|e| Error::Config(format!("Failed to rename config file: {}", e)))?;

        Ok(())
    }

    /// Update the refresh interval in place.
    pub async fn set_refresh_interval(&self, secs: u64) -> Result<()> {
        let mut settings = self.load().await?;
        settings.refresh_interval_secs = secs;
        self.save(&settings).await
    }
}
