//! Subcommand implementations.

pub mod config;
pub mod render;
pub mod serve;

use std::path::PathBuf;

use reliefmap::config::{config_file_path, ServiceConfig};

use crate::error::CliError;

/// Loads the config file (explicit path or default) plus the environment.
pub fn load_config(path: Option<PathBuf>) -> Result<ServiceConfig, CliError> {
    let path = path.unwrap_or_else(config_file_path);
    Ok(ServiceConfig::load_with(&path, |name| std::env::var(name).ok())?)
}
