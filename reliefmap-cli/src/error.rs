//! CLI error type.

use std::fmt;
use std::io;

use reliefmap::config::ConfigError;
use reliefmap::dem::DemError;
use reliefmap::relief::RenderError;

/// Errors surfaced to the user by a command.
#[derive(Debug)]
pub enum CliError {
    /// A setting is missing or inconsistent.
    Config(String),
    /// The config file could not be loaded.
    ConfigFile(ConfigError),
    /// Log directory or subscriber setup failed.
    Logging(io::Error),
    /// An adapter (database, storage, engine, depth) could not be built.
    Setup(String),
    /// The async runtime or signal handler could not be started.
    Runtime(String),
    /// Offline rendering failed.
    Render(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Logging(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Setup(msg) => write!(f, "Startup failed: {}", msg),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            CliError::Render(msg) => write!(f, "Render failed: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Logging(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<RenderError> for CliError {
    fn from(e: RenderError) -> Self {
        CliError::Render(e.to_string())
    }
}

impl From<DemError> for CliError {
    fn from(e: DemError) -> Self {
        CliError::Render(e.to_string())
    }
}
