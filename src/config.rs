use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::utils;

/// Current configuration version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Empty means the profile's default location.
    #[serde(default)]
    pub database_path: String,
    /// Weekday name ("Monday", "sun", ...) on which the "this week" bucket starts.
    #[serde(default = "default_week_starts_on")]
    pub week_starts_on: String,
    /// How long the live view stays subscribed after its last observer leaves.
    #[serde(default = "default_feed_grace_period_ms")]
    pub feed_grace_period_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_config_version")]
    pub config_version: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            week_starts_on: default_week_starts_on(),
            feed_grace_period_ms: default_feed_grace_period_ms(),
            log_level: default_log_level(),
            config_version: Some(CURRENT_CONFIG_VERSION),
        }
    }
}

// Default value functions
fn default_database_path() -> String {
    // This is a fallback - actual profile will be determined at load time
    if let Some(data_dir) = utils::get_data_dir(utils::Profile::Prod) {
        data_dir.join("tasks.db").to_string_lossy().to_string()
    } else {
        "~/.local/share/tasklane/tasks.db".to_string()
    }
}

fn default_week_starts_on() -> String {
    "Monday".to_string()
}

fn default_feed_grace_period_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_config_version() -> Option<u32> {
    Some(CURRENT_CONFIG_VERSION)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config directory: {0}")]
    ConfigDirError(String),
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Invalid week start '{0}': expected a weekday name")]
    InvalidWeekStart(String),
}

impl Config {
    /// Load configuration from file, or create default if missing
    /// Uses the provided profile to determine config and database paths
    ///
    /// The flag is true when a default config file was written on this call.
    pub fn load_with_profile(profile: utils::Profile) -> Result<(Self, bool), ConfigError> {
        let config_path = Self::get_config_path(profile)?;
        Self::load_or_create(&config_path, profile)
    }

    fn load_or_create(config_path: &Path, profile: utils::Profile) -> Result<(Self, bool), ConfigError> {
        if config_path.exists() {
            let mut config = Self::read_file(config_path)?;

            // An unset database path follows the profile
            if config.database_path.trim().is_empty() {
                config.database_path = Self::default_database_path_for_profile(profile);
            }

            Ok((config, false))
        } else {
            // Create default config and save it
            let mut config = Config::default();
            config.database_path = Self::default_database_path_for_profile(profile);
            config.save_to(config_path)?;
            Ok((config, true))
        }
    }

    /// Load configuration from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let mut config = Self::read_file(path)?;
        if config.database_path.trim().is_empty() {
            config.database_path = default_database_path();
        }
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;
        let config: Config = toml::from_str(&contents)?;
        config.week_start()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&mut self, path: &Path) -> Result<(), ConfigError> {
        // Ensure config version is set before saving
        self.config_version = Some(CURRENT_CONFIG_VERSION);

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::WriteError(e.to_string()))?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the config file
    pub fn get_config_path(profile: utils::Profile) -> Result<PathBuf, ConfigError> {
        let config_dir = utils::get_config_dir(profile)
            .ok_or_else(|| ConfigError::ConfigDirError("Could not determine config directory".to_string()))?;
        Ok(config_dir.join("config.toml"))
    }

    /// Get default database path for a specific profile
    fn default_database_path_for_profile(profile: utils::Profile) -> String {
        if let Some(data_dir) = utils::get_data_dir(profile) {
            data_dir.join("tasks.db").to_string_lossy().to_string()
        } else {
            match profile {
                utils::Profile::Dev => "~/.local/share/tasklane-dev/tasks.db".to_string(),
                utils::Profile::Prod => "~/.local/share/tasklane/tasks.db".to_string(),
            }
        }
    }

    /// Get the expanded database path (with ~ expansion)
    pub fn get_database_path(&self) -> PathBuf {
        utils::expand_path(&self.database_path)
    }

    /// Parsed `week_starts_on`
    pub fn week_start(&self) -> Result<Weekday, ConfigError> {
        self.week_starts_on
            .trim()
            .parse::<Weekday>()
            .map_err(|_| ConfigError::InvalidWeekStart(self.week_starts_on.clone()))
    }

    pub fn feed_grace_period(&self) -> Duration {
        Duration::from_millis(self.feed_grace_period_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = toml::from_str("week_starts_on = \"sunday\"").unwrap();
        assert_eq!(config.week_start().unwrap(), Weekday::Sun);
        assert_eq!(config.feed_grace_period(), Duration::from_millis(5000));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.config_version, Some(CURRENT_CONFIG_VERSION));
    }

    #[test]
    fn default_week_starts_on_monday() {
        assert_eq!(Config::default().week_start().unwrap(), Weekday::Mon);
    }

    #[test]
    fn bad_week_start_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "week_starts_on = \"someday\"\n").unwrap();

        assert!(matches!(Config::load_from(&path), Err(ConfigError::InvalidWeekStart(_))));
    }

    #[test]
    fn save_and_load_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config {
            database_path: "/tmp/elsewhere.db".to_string(),
            week_starts_on: "Sat".to_string(),
            feed_grace_period_ms: 250,
            log_level: "debug".to_string(),
            config_version: None,
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.database_path, "/tmp/elsewhere.db");
        assert_eq!(loaded.week_start().unwrap(), Weekday::Sat);
        assert_eq!(loaded.feed_grace_period(), Duration::from_millis(250));
        assert_eq!(loaded.config_version, Some(CURRENT_CONFIG_VERSION));
    }

    #[test]
    fn first_load_writes_default_and_later_loads_keep_custom_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let (config, created) = Config::load_or_create(&path, utils::Profile::Dev).unwrap();
        assert!(created);
        assert!(path.exists());
        assert!(config.database_path.contains("tasklane-dev"));

        fs::write(&path, "database_path = \"/srv/tasks/mine.db\"\n").unwrap();
        let (config, created) = Config::load_or_create(&path, utils::Profile::Dev).unwrap();
        assert!(!created);
        assert_eq!(config.get_database_path(), PathBuf::from("/srv/tasks/mine.db"));
    }

    #[test]
    fn unset_database_path_follows_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "log_level = \"debug\"\n").unwrap();

        let (config, _) = Config::load_or_create(&path, utils::Profile::Dev).unwrap();
        assert!(config.database_path.contains("tasklane-dev"));
        assert!(!Config::load_from(&path).unwrap().database_path.is_empty());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.week_starts_on, "Monday");
    }
}
