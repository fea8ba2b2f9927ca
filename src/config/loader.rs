//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
///
/// Environment overrides are applied after the file is parsed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ServerConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Build a configuration from defaults plus environment overrides.
pub fn load_default() -> Result<ServerConfig, ConfigError> {
    let mut config = ServerConfig::default();
    apply_env_overrides(&mut config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Apply `SERVER_HOST`, `SERVER_PORT`, `RATE_LIMIT`, `LOG_LEVEL` and
/// `CACHE_ENABLED` from the process environment.
pub fn apply_env_overrides(config: &mut ServerConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |var| std::env::var(var).ok())
}

pub(crate) fn apply_overrides_from<F>(config: &mut ServerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("SERVER_HOST").filter(|v| !v.is_empty()) {
        config.listener.host = host;
    }
    if let Some(port) = lookup("SERVER_PORT").filter(|v| !v.is_empty()) {
        config.listener.port = port
            .parse()
            .map_err(|_| ConfigError::Env { var: "SERVER_PORT", value: port })?;
    }
    if let Some(limit) = lookup("RATE_LIMIT").filter(|v| !v.is_empty()) {
        config.security.rate_limit = limit
            .parse()
            .map_err(|_| ConfigError::Env { var: "RATE_LIMIT", value: limit })?;
    }
    if let Some(level) = lookup("LOG_LEVEL").filter(|v| !v.is_empty()) {
        config.observability.log_level = level.to_lowercase();
    }
    if let Some(enabled) = lookup("CACHE_ENABLED").filter(|v| !v.is_empty()) {
        config.cache.enabled = matches!(enabled.to_lowercase().as_str(), "true" | "1" | "yes");
    }
    Ok(())
}
