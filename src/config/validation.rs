//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (worker count, per-IP ceiling, limits)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::EngineConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.hostname must not be empty")]
    EmptyHostname,

    #[error("server.worker_count must be at least 1")]
    NoWorkers,

    #[error("server.max_connections_per_ip must be at least 1")]
    NoConnectionsPerIp,

    #[error("server.backlog must be at least 1")]
    NoBacklog,

    #[error("server.worker_queue_depth must be at least 1")]
    NoQueueDepth,

    #[error("limits.{0} must be at least 1")]
    ZeroLimit(&'static str),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Check every semantic constraint, collecting all violations.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    if server.hostname.trim().is_empty() {
        errors.push(ValidationError::EmptyHostname);
    }
    if server.worker_count == 0 {
        errors.push(ValidationError::NoWorkers);
    }
    if server.max_connections_per_ip == 0 {
        errors.push(ValidationError::NoConnectionsPerIp);
    }
    if server.backlog == 0 {
        errors.push(ValidationError::NoBacklog);
    }
    if server.worker_queue_depth == 0 {
        errors.push(ValidationError::NoQueueDepth);
    }

    let limits = &config.limits;
    if limits.max_header_bytes == 0 {
        errors.push(ValidationError::ZeroLimit("max_header_bytes"));
    }
    if limits.max_headers == 0 {
        errors.push(ValidationError::ZeroLimit("max_headers"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            observability.metrics_address.clone(),
        ));
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

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&EngineConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_violation() {
        let mut config = EngineConfig::default();
        config.server.worker_count = 0;
        config.server.max_connections_per_ip = 0;
        config.limits.max_headers = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::NoWorkers,
                ValidationError::NoConnectionsPerIp,
                ValidationError::ZeroLimit("max_headers"),
            ]
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = EngineConfig::default();
        config.observability.metrics_address = "not-an-address".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::MetricsAddress("not-an-address".into())])
        );
    }
}
