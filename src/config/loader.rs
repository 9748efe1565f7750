//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{DeliveryMode, GatewayConfig, LedgerBackend};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
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

/// Load, override from the process environment, and validate.
///
/// Without a path, defaults are used as the base.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

pub fn parse_config(content: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply the deployment environment variables on top of file values.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = lookup("PROCESSOR_DEFAULT_URL") {
        config.processors.default_url = url;
    }
    if let Some(url) = lookup("PROCESSOR_FALLBACK_URL") {
        config.processors.fallback_url = url;
    }
    if let Some(port) = lookup("APP_PORT") {
        let host = config
            .listener
            .bind_address
            .rsplit_once(':')
            .map(|(host, _)| host.to_string())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        config.listener.bind_address = format!("{}:{}", host, port);
    }
    if let Some(mode) = lookup("GATEWAY_MODE") {
        match mode.to_ascii_lowercase().as_str() {
            "sync" => config.gateway.mode = DeliveryMode::Sync,
            "async" => config.gateway.mode = DeliveryMode::Async,
            other => tracing::warn!(mode = %other, "Ignoring unknown GATEWAY_MODE"),
        }
    }

    let redis_host = lookup("REDIS_HOST");
    let redis_port = lookup("REDIS_PORT");
    if redis_host.is_some() || redis_port.is_some() {
        config.ledger.backend = LedgerBackend::Redis;
        config.ledger.redis_url = Some(format!(
            "redis://{}:{}/",
            redis_host.as_deref().unwrap_or("redis"),
            redis_port.as_deref().unwrap_or("6379"),
        ));
    }
}
