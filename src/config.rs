//! Configuration management for blockfacts

use crate::error::{LedgerError, Result};
use chrono::FixedOffset;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Fixed timezone, in seconds east of UTC, used to bucket daily blocks.
    #[serde(default)]
    pub utc_offset_secs: i32,
    /// How many times a clashing first-time insert is retried as an increment.
    #[serde(default = "default_create_retries")]
    pub create_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            utc_offset_secs: 0,
            create_retries: default_create_retries(),
        }
    }
}

impl LedgerConfig {
    pub fn day_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_secs).ok_or_else(|| {
            LedgerError::Config(format!(
                "ledger.utc_offset_secs {} is not a valid timezone offset",
                self.utc_offset_secs
            ))
        })
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.database.path.is_empty() {
            return Err(LedgerError::Config("database.path must be set in config.toml".into()));
        }

        if self.ledger.create_retries == 0 {
            return Err(LedgerError::Config("ledger.create_retries must be at least 1".into()));
        }

        self.ledger.day_offset()?;
        Ok(())
    }
}

/// Loads `config.toml` from the working directory.
pub fn load_config() -> Result<Config> {
    load_config_from(DEFAULT_CONFIG_FILE)
}

/// Loads the configuration at `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let config_str = match fs::read_to_string(path.as_ref()) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let config = parse_config(&config_str)?;
    config.validate()?;
    Ok(config)
}

pub fn parse_config(config_str: &str) -> Result<Config> {
    if config_str.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(toml::from_str(config_str)?)
}

fn default_db_path() -> String {
    "./data/blockfacts.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_create_retries() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = TempDir::new().unwrap();
        let config = load_config_from(dir.path().join("missing.toml")).unwrap();

        assert_eq!(config.database.path, "./data/blockfacts.db");
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.ledger.utc_offset_secs, 0);
        assert_eq!(config.ledger.create_retries, 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse_config(
            r#"
            [database]
            path = "/var/lib/blockfacts/facts.db"

            [ledger]
            utc_offset_secs = 28800
            "#,
        )
        .unwrap();

        assert_eq!(config.database.path, "/var/lib/blockfacts/facts.db");
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.ledger.utc_offset_secs, 28800);
        assert_eq!(config.ledger.create_retries, 3);
        assert_eq!(config.ledger.day_offset().unwrap().local_minus_utc(), 28800);
    }

    #[test]
    fn test_rejects_empty_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[database]\npath = \"\"\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, LedgerError::Config(msg) if msg.contains("database.path")));
    }

    #[test]
    fn test_rejects_out_of_range_offset() {
        let config = parse_config("[ledger]\nutc_offset_secs = 90000\n").unwrap();
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_rejects_zero_retries() {
        let config = parse_config("[ledger]\ncreate_retries = 0\n").unwrap();
        assert!(matches!(config.validate(), Err(LedgerError::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = parse_config("[database\npath = 1").unwrap_err();
        assert!(matches!(err, LedgerError::Config(_)));
    }
}
