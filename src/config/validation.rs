//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (worker counts > 0, addresses parse)
//! - Detect applications installed twice
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::config::schema::ServerConfig;
use crate::webapp::normalize_root;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("server.name must not be empty")]
    EmptyServerName,

    #[error("server.host must not be empty")]
    EmptyHost,

    #[error("connector.worker_threads must be at least 1")]
    NoWorkers,

    #[error("connector.queue_depth must be at least 1")]
    NoQueue,

    #[error("observability.log_level `{0}` is not one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),

    #[error("application root {} is listed more than once", .0.display())]
    DuplicateApplication(PathBuf),
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.trim().is_empty() {
        errors.push(ValidationError::EmptyServerName);
    }
    if config.server.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }
    if config.connector.worker_threads == 0 {
        errors.push(ValidationError::NoWorkers);
    }
    if config.connector.queue_depth == 0 {
        errors.push(ValidationError::NoQueue);
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::InvalidLogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let mut roots = HashSet::new();
    for app in &config.applications {
        let root = normalize_root(&app.root);
        if !roots.insert(root.clone()) {
            errors.push(ValidationError::DuplicateApplication(root));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ApplicationConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ServerConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.server.host = " ".into();
        config.connector.worker_threads = 0;
        config.observability.log_level = "loud".into();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".into();
        config.applications = vec![
            ApplicationConfig { root: "/srv/shop".into() },
            ApplicationConfig { root: "/srv/./shop".into() },
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyHost,
                ValidationError::NoWorkers,
                ValidationError::InvalidLogLevel("loud".into()),
                ValidationError::InvalidMetricsAddress("nowhere".into()),
                ValidationError::DuplicateApplication("/srv/shop".into()),
            ]
        );
    }
}
