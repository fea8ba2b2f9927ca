//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (pool size, queue depth, windows > 0)
//! - Validate method tokens and exporter address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::Method;

use crate::config::schema::ServerConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.thread_pool_size == 0 {
        errors.push(ValidationError::new("listener.thread_pool_size", "must be at least 1"));
    }
    if config.listener.queue_depth == 0 {
        errors.push(ValidationError::new("listener.queue_depth", "must be at least 1"));
    }
    if config.listener.timeout_secs == 0 {
        errors.push(ValidationError::new("listener.timeout_secs", "must be at least 1"));
    }

    let security = &config.security;
    if security.rate_limit_enabled {
        if security.rate_limit == 0 {
            errors.push(ValidationError::new("security.rate_limit", "must be at least 1"));
        }
        if security.window_secs == 0 {
            errors.push(ValidationError::new("security.window_secs", "must be at least 1"));
        }
    }
    if security.allowed_methods.is_empty() {
        errors.push(ValidationError::new("security.allowed_methods", "must not be empty"));
    }
    for method in &security.allowed_methods {
        if Method::from_bytes(method.as_bytes()).is_err() || method.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push(ValidationError::new(
                "security.allowed_methods",
                format!("invalid method token {method:?}"),
            ));
        }
    }
    if security.cors_enabled && security.cors_origins.is_empty() {
        errors.push(ValidationError::new("security.cors_origins", "must not be empty when CORS is enabled"));
    }

    if config.cache.enabled && config.cache.max_size == 0 {
        errors.push(ValidationError::new("cache.max_size", "must be at least 1 when caching is enabled"));
    }

    let observability = &config.observability;
    if observability.prometheus_enabled && observability.prometheus_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.prometheus_address",
            format!("not a socket address: {:?}", observability.prometheus_address),
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
        assert!(validate_config(&ServerConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_error() {
        let mut config = ServerConfig::default();
        config.listener.thread_pool_size = 0;
        config.listener.queue_depth = 0;
        config.security.allowed_methods = vec!["get".into(), "BAD METHOD".into()];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.thread_pool_size",
                "listener.queue_depth",
                "security.allowed_methods",
                "security.allowed_methods",
            ]
        );
    }

    #[test]
    fn disabled_rate_limit_skips_its_checks() {
        let mut config = ServerConfig::default();
        config.security.rate_limit_enabled = false;
        config.security.rate_limit = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn prometheus_address_checked_only_when_enabled() {
        let mut config = ServerConfig::default();
        config.observability.prometheus_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());
        config.observability.prometheus_enabled = true;
        assert_eq!(validate_config(&config).unwrap_err().len(), 1);
    }
}
