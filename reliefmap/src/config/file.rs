//! Loading the configuration file.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::env::apply_env;
use super::parser::parse_ini;
use super::settings::ServiceConfig;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// A setting the requested command needs is empty.
    #[error("Missing configuration: {0} is required")]
    Missing(&'static str),
}

impl ServiceConfig {
    /// Loads `~/.reliefmap/config.ini` and overlays the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&config_file_path(), |name| std::env::var(name).ok())
    }

    /// Loads `path` (defaults if absent) and overlays values from `lookup`.
    pub fn load_with<F>(path: &Path, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::load_from(path)?;
        apply_env(&mut config, lookup)?;
        Ok(config)
    }

    /// Loads `path` without environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Checks the settings the queue workers cannot start without.
    pub fn validate_for_workers(&self) -> Result<(), ConfigError> {
        if self.broker.url.trim().is_empty() {
            return Err(ConfigError::Missing("broker.url (RABBITMQ_URL)"));
        }
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Missing("database.url (DATABASE_URL)"));
        }
        if self.engine.url.trim().is_empty() {
            return Err(ConfigError::Missing("engine.url (NODEODM_URL)"));
        }
        Ok(())
    }
}

/// Path to the config directory (~/.reliefmap).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reliefmap")
}

/// Path to the config file (~/.reliefmap/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = ServiceConfig::load_from(&temp_dir.path().join("missing.ini")).unwrap();
        assert_eq!(config, ServiceConfig::default());
    }

    #[test]
    fn test_file_then_environment() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(
            &path,
            "[broker]\nqueue = from-file\nprefetch = 3\n\n[database]\nurl = postgres://file/db\n",
        )
        .unwrap();

        let config = ServiceConfig::load_with(&path, |name| match name {
            "RABBITMQ_QUEUE_NAME" => Some("from-env".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.broker.queue, "from-env");
        assert_eq!(config.broker.prefetch, 3);
        assert_eq!(config.database.url, "postgres://file/db");
    }

    #[test]
    fn test_workers_need_database() {
        let config = ServiceConfig::default();
        assert!(matches!(
            config.validate_for_workers(),
            Err(ConfigError::Missing(_))
        ));

        let mut config = ServiceConfig::default();
        config.database.url = "postgres://localhost/heightmaps".to_string();
        assert!(config.validate_for_workers().is_ok());
    }

    #[test]
    fn test_config_file_path() {
        assert!(config_file_path().ends_with(".reliefmap/config.ini"));
    }
}
