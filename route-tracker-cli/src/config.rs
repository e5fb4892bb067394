//! Configuration loading and parsing

use anyhow::{Context, Result};
use route_tracker::TrackerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory; tracker data lives in a namespaced subdirectory
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tracking-data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReplayConfig {
    /// Delay between replayed samples; defaults to the request's fastest interval
    pub pacing_ms: Option<u64>,
    /// Give up waiting for a replay after this long
    #[serde(default = "default_replay_timeout")]
    pub timeout_secs: u64,
}

fn default_replay_timeout() -> u64 {
    600
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            pacing_ms: None,
            timeout_secs: default_replay_timeout(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .tracker
        .validate()
        .with_context(|| format!("Invalid tracker settings in {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [storage]
            dir = "/var/lib/route-tracker"

            [tracker]
            append_retries = 2

            [tracker.location]
            interval_ms = 5000
            fastest_interval_ms = 1000
            priority = "balanced"

            [tracker.filter]
            min_displacement_m = 50.0
            min_interval_ms = 60000

            [replay]
            pacing_ms = 0
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.storage.dir, PathBuf::from("/var/lib/route-tracker"));
        assert_eq!(config.tracker.append_retries, 2);
        assert_eq!(config.tracker.location.interval_ms, 5000);
        assert_eq!(config.tracker.location.min_displacement_m, 100.0);
        assert_eq!(config.tracker.filter.min_displacement_m, 50.0);
        assert_eq!(config.tracker.filter.min_interval_ms, Some(60_000));
        assert_eq!(config.replay.pacing_ms, Some(0));
        assert_eq!(config.replay.timeout_secs, 600);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.storage.dir, PathBuf::from("./tracking-data"));
        assert_eq!(config.tracker, TrackerConfig::default());
        assert_eq!(config.replay.pacing_ms, None);
        assert_eq!(config.replay.timeout_secs, 600);
    }

    #[test]
    fn test_load_config_rejects_invalid_tracker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[tracker.bus]\nqueue_capacity = 0\n").unwrap();

        assert!(load_config(&path).is_err());
    }
}
