//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ConnectorKind;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.connector.kind, ConnectorKind::Blocking);
        assert!(config.applications.is_empty());
    }

    #[test]
    fn full_config() {
        let config = parse_config(
            r#"
[server]
name = "edge"
host = "127.0.0.1"
port = 9000

[connector]
kind = "reactor"
worker_threads = 4
drain_timeout_secs = 2

[[applications]]
root = "/srv/ROOT"

[[applications]]
root = "/srv/shop"

[observability]
log_level = "info"
json = true
"#,
        )
        .unwrap();

        assert_eq!(config.server.name, "edge");
        assert_eq!(config.connector.kind, ConnectorKind::Reactor);
        assert_eq!(config.connector.worker_threads, 4);
        assert_eq!(config.connector.queue_depth, 64);
        assert_eq!(config.connector.drain_timeout().as_secs(), 2);
        assert_eq!(config.applications.len(), 2);
        assert!(config.observability.json);
    }

    #[test]
    fn unknown_connector_kind_is_a_parse_error() {
        assert!(matches!(
            parse_config("[connector]\nkind = \"fibers\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn invalid_values_fail_validation() {
        let err = parse_config("[connector]\nworker_threads = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors == &[ValidationError::NoWorkers]));
        assert!(err.to_string().contains("worker_threads"));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "[server]\nport = 0\n").unwrap();
        assert_eq!(load_config(&path).unwrap().server.port, 0);
        assert!(matches!(
            load_config(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
