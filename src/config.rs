use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_summary_length")]
    pub summary_length: usize,

    /// Plain-text characters an update must add before subscribers hear about it.
    #[serde(default = "default_significance_threshold")]
    pub significance_threshold: usize,

    #[serde(default = "default_update_window_days")]
    pub update_window_days: u32,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// Batches reconciled at the same time.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feed-receiver");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("entries.db").to_string_lossy().to_string()
}

fn default_summary_length() -> usize {
    256
}

fn default_significance_threshold() -> usize {
    50
}

fn default_update_window_days() -> u32 {
    7
}

fn default_cache_capacity() -> usize {
    100_000
}

fn default_cache_ttl_seconds() -> u64 {
    7 * 24 * 60 * 60
}

fn default_workers() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            summary_length: default_summary_length(),
            significance_threshold: default_significance_threshold(),
            update_window_days: default_update_window_days(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            workers: default_workers(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feed-receiver")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config: Config = toml::from_str(r#"db_path = "/tmp/entries.db""#).unwrap();
        assert_eq!(config.db_path, "/tmp/entries.db");
        assert_eq!(config.summary_length, 256);
        assert_eq!(config.significance_threshold, 50);
        assert_eq!(config.update_window_days, 7);
        assert_eq!(config.workers, 5);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config {
            db_path: "/tmp/entries.db".to_string(),
            workers: 2,
            ..Config::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.workers, 2);
        assert_eq!(parsed.cache_ttl_seconds, config.cache_ttl_seconds);
    }
}
