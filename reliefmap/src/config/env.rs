//! Environment variable overrides.
//!
//! The deployment configures the service through these variables; they win
//! over the config file.
//!
//! | Variable | Setting |
//! |---|---|
//! | `RABBITMQ_URL` | `broker.url` |
//! | `RABBITMQ_QUEUE_NAME` | `broker.queue` |
//! | `RABBITMQ_PREFETCH_COUNT` | `broker.prefetch` |
//! | `DATABASE_URL` | `database.url` |
//! | `NODEODM_URL` | `engine.url` |
//! | `TEMP_DIR` | `processing.temp_dir` |
//! | `DEPTH_ESTIMATOR_URL` | `depth.url` |
//! | `LOG_LEVEL` | `logging.level` |

use std::path::PathBuf;

use super::file::ConfigError;
use super::parser::parse_positive;
use super::settings::ServiceConfig;

/// Overlays variables found by `lookup` onto `config`.
///
/// Empty variables are ignored.
pub(super) fn apply_env<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = get("RABBITMQ_URL") {
        config.broker.url = v;
    }
    if let Some(v) = get("RABBITMQ_QUEUE_NAME") {
        config.broker.queue = v;
    }
    if let Some(v) = get("RABBITMQ_PREFETCH_COUNT") {
        config.broker.prefetch = parse_positive("env", "RABBITMQ_PREFETCH_COUNT", &v)?;
    }
    if let Some(v) = get("DATABASE_URL") {
        config.database.url = v;
    }
    if let Some(v) = get("NODEODM_URL") {
        config.engine.url = v;
    }
    if let Some(v) = get("TEMP_DIR") {
        config.processing.temp_dir = PathBuf::from(v);
    }
    if let Some(v) = get("DEPTH_ESTIMATOR_URL") {
        config.depth.url = v;
    }
    if let Some(v) = get("LOG_LEVEL") {
        config.logging.level = v;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn apply(vars: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = ServiceConfig::default();
        apply_env(&mut config, |name| vars.get(name).cloned())?;
        Ok(config)
    }

    #[test]
    fn test_overrides() {
        let config = apply(&[
            ("RABBITMQ_URL", "amqp://u:p@mq:5672/"),
            ("RABBITMQ_QUEUE_NAME", "tasks"),
            ("RABBITMQ_PREFETCH_COUNT", "2"),
            ("DATABASE_URL", "postgres://db/heightmaps"),
            ("NODEODM_URL", "http://odm:3000"),
            ("TEMP_DIR", "/scratch"),
            ("DEPTH_ESTIMATOR_URL", "http://depth:8000"),
            ("LOG_LEVEL", "WARNING"),
        ])
        .unwrap();

        assert_eq!(config.broker.url, "amqp://u:p@mq:5672/");
        assert_eq!(config.broker.queue, "tasks");
        assert_eq!(config.broker.batch_queue(), "tasks_batch");
        assert_eq!(config.broker.prefetch, 2);
        assert_eq!(config.database.url, "postgres://db/heightmaps");
        assert_eq!(config.engine.url, "http://odm:3000");
        assert_eq!(config.processing.temp_dir, PathBuf::from("/scratch"));
        assert_eq!(config.depth.url, "http://depth:8000");
        assert_eq!(config.logging.level, "WARNING");
    }

    #[test]
    fn test_defaults_match_deployment() {
        let config = apply(&[]).unwrap();
        assert_eq!(config.broker.queue, "heightmap.tasks");
        assert_eq!(config.broker.batch_queue(), "heightmap.tasks_batch");
        assert_eq!(config.broker.prefetch, 1);
        assert_eq!(config.engine.url, "http://nodeodm:3000");
        assert_eq!(config.processing.temp_dir, PathBuf::from("/tmp/heightmap_processing"));
    }

    #[test]
    fn test_empty_variable_is_ignored() {
        let config = apply(&[("DATABASE_URL", "  ")]).unwrap();
        assert!(config.database.url.is_empty());
    }

    #[test]
    fn test_bad_prefetch() {
        let err = apply(&[("RABBITMQ_PREFETCH_COUNT", "many")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "RABBITMQ_PREFETCH_COUNT"));
    }
}
