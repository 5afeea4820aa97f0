//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Catch admin settings that would expose the API unprotected
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ControlPlaneConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ControlPlaneConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ControlPlaneConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.max_streams == 0 {
        errors.push(ValidationError::new("listener.max_streams", "must be greater than 0"));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() || tls.key_path.is_empty() {
            errors.push(ValidationError::new(
                "listener.tls",
                "cert_path and key_path are both required",
            ));
        }
    }

    let discovery = &config.discovery;
    if discovery.nack_backoff_base_ms == 0 {
        errors.push(ValidationError::new(
            "discovery.nack_backoff_base_ms",
            "must be greater than 0",
        ));
    }
    if discovery.nack_backoff_max_ms < discovery.nack_backoff_base_ms {
        errors.push(ValidationError::new(
            "discovery.nack_backoff_max_ms",
            "must not be smaller than nack_backoff_base_ms",
        ));
    }
    if discovery.fetch_timeout_secs == 0 {
        errors.push(ValidationError::new("discovery.fetch_timeout_secs", "must be greater than 0"));
    }
    if discovery.stream_buffer == 0 {
        errors.push(ValidationError::new("discovery.stream_buffer", "must be greater than 0"));
    }

    if config.bootstrap.node_group.trim().is_empty() {
        errors.push(ValidationError::new("bootstrap.node_group", "must not be empty"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("{:?} is not a socket address", value)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ControlPlaneConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = ControlPlaneConfig::default();
        config.listener.bind_address = "localhost".into();
        config.listener.max_streams = 0;
        config.listener.tls = Some(TlsConfig {
            cert_path: String::new(),
            key_path: "key.pem".into(),
        });
        config.discovery.nack_backoff_base_ms = 5_000;
        config.discovery.nack_backoff_max_ms = 1_000;
        config.admin.enabled = true;
        config.admin.api_key = " ".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "listener.max_streams",
                "listener.tls",
                "discovery.nack_backoff_max_ms",
                "admin.api_key",
            ]
        );
    }

    #[test]
    fn metrics_address_ignored_when_disabled() {
        let mut config = ControlPlaneConfig::default();
        config.observability.metrics_enabled = false;
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());
    }
}
