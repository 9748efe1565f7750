//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check processor URLs are usable
//! - Validate value ranges (intervals > 0, pool sizes > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use url::Url;

use crate::config::schema::{GatewayConfig, LedgerBackend, PLACEHOLDER_ADMIN_KEY};

#[derive(Debug, Clone, PartialEq, Eq)]
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(&mut errors, "processors.default_url", &config.processors.default_url);
    check_url(&mut errors, "processors.fallback_url", &config.processors.fallback_url);

    if config.processors.request_timeout_ms == 0 {
        errors.push(ValidationError::new("processors.request_timeout_ms", "must be > 0"));
    }
    if config.health_check.interval_ms == 0 {
        errors.push(ValidationError::new("health_check.interval_ms", "must be > 0"));
    }
    if config.health_check.timeout_ms == 0 {
        errors.push(ValidationError::new("health_check.timeout_ms", "must be > 0"));
    }
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be > 0"));
    }
    if config.retries.multiplier == 0 {
        errors.push(ValidationError::new("retries.multiplier", "must be > 0"));
    }
    if config.retries.max_delay_ms < config.retries.base_delay_ms {
        errors.push(ValidationError::new(
            "retries.max_delay_ms",
            "must be >= retries.base_delay_ms",
        ));
    }
    if config.retries.max_cycles == Some(0) {
        errors.push(ValidationError::new("retries.max_cycles", "must be > 0 when set"));
    }
    if config.workers.concurrency == 0 {
        errors.push(ValidationError::new("workers.concurrency", "must be > 0"));
    }
    if config.workers.queue_capacity == 0 {
        errors.push(ValidationError::new("workers.queue_capacity", "must be > 0"));
    }
    if config.ledger.backend == LedgerBackend::Redis && config.ledger.redis_url.is_none() {
        errors.push(ValidationError::new("ledger.redis_url", "required for the redis backend"));
    }
    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::new("admin.api_key", "must not be empty"));
    } else if config.admin.enabled && config.admin.api_key == PLACEHOLDER_ADMIN_KEY {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be changed from the placeholder when admin is enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.is_empty() {
        errors.push(ValidationError::new(field, "is required"));
        return;
    }
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, e.to_string())),
    }
}
