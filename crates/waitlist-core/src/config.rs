//! Waitlist configuration management.
//!
//! Holds the offer window, the optional data directory for persisted
//! queues, and the retry policy used when a persistence write fails.
//!
//! Configuration is stored at `~/.config/waitlist/config.json`.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "waitlist";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default time an entrant has to accept an offer: 48 hours.
pub const DEFAULT_OFFER_WINDOW_SECS: u64 = 48 * 60 * 60;

/// Offers shorter than this would lapse the moment they are made.
pub const MIN_OFFER_WINDOW_SECS: u64 = 1;

/// Persistence writes are attempted this many times before the operation fails.
pub const DEFAULT_PERSIST_MAX_RETRIES: u32 = 3;

/// First retry waits this long; each later retry doubles it.
pub const DEFAULT_PERSIST_INITIAL_BACKOFF_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitlistConfig {
    pub offer_window_secs: u64,
    /// When unset, queues live in memory only.
    pub data_dir: Option<PathBuf>,
    pub persist_max_retries: u32,
    pub persist_initial_backoff_ms: u64,
}

impl Default for WaitlistConfig {
    fn default() -> Self {
        Self {
            offer_window_secs: DEFAULT_OFFER_WINDOW_SECS,
            data_dir: None,
            persist_max_retries: DEFAULT_PERSIST_MAX_RETRIES,
            persist_initial_backoff_ms: DEFAULT_PERSIST_INITIAL_BACKOFF_MS,
        }
    }
}

impl WaitlistConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Default data directory when none is configured explicitly.
    pub fn default_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// The configured data directory, or the platform default
    /// (e.g. `~/.local/share/waitlist`) when none is set.
    pub fn data_dir_or_default(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_data_dir(),
        }
    }

    pub fn with_offer_window(mut self, window: Duration) -> Self {
        self.offer_window_secs = window.num_seconds().max(MIN_OFFER_WINDOW_SECS as i64) as u64;
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn offer_window(&self) -> Duration {
        let secs = self
            .offer_window_secs
            .clamp(MIN_OFFER_WINDOW_SECS, i64::MAX as u64);
        Duration::seconds(secs as i64)
    }

    pub fn persist_initial_backoff(&self) -> StdDuration {
        StdDuration::from_millis(self.persist_initial_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WaitlistConfig::default();
        assert_eq!(config.offer_window(), Duration::hours(48));
        assert_eq!(config.persist_max_retries, 3);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: WaitlistConfig = serde_json::from_str(r#"{"offer_window_secs": 3600}"#).unwrap();
        assert_eq!(config.offer_window(), Duration::hours(1));
        assert_eq!(config.persist_max_retries, DEFAULT_PERSIST_MAX_RETRIES);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = WaitlistConfig::default()
            .with_offer_window(Duration::hours(24))
            .with_data_dir(dir.path().join("data"));
        config.save_to(&path).unwrap();

        let loaded = WaitlistConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_zero_offer_window_is_raised() {
        let config: WaitlistConfig = serde_json::from_str(r#"{"offer_window_secs": 0}"#).unwrap();
        assert_eq!(config.offer_window(), Duration::seconds(1));

        let config = WaitlistConfig::default().with_offer_window(Duration::zero());
        assert_eq!(config.offer_window_secs, MIN_OFFER_WINDOW_SECS);
    }

    #[test]
    fn test_data_dir_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = WaitlistConfig::default().with_data_dir(dir.path());
        assert_eq!(config.data_dir_or_default().unwrap(), dir.path());

        // Falls back to the platform data directory when one exists
        if let Ok(default_dir) = WaitlistConfig::default().data_dir_or_default() {
            assert!(default_dir.ends_with(APP_NAME));
        }
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = WaitlistConfig::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, WaitlistConfig::default());
    }
}
