//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the payment gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Base URLs of the two payment processors.
    pub processors: ProcessorsConfig,

    /// Health observer settings.
    pub health_check: HealthCheckConfig,

    /// Retry and backoff policy for undelivered payments.
    pub retries: RetryConfig,

    /// Bounded worker pool for asynchronous delivery.
    pub workers: WorkerConfig,

    /// Request handling behaviour.
    pub gateway: GatewaySettings,

    /// Where delivered payments are recorded.
    pub ledger: LedgerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9999").
    pub bind_address: String,

    /// Request timeout for the gateway-facing surface, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Processor endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessorsConfig {
    /// Base URL of the cheaper "default" processor.
    pub default_url: String,

    /// Base URL of the "fallback" processor.
    pub fallback_url: String,

    /// Timeout for a single submission or admin call, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ProcessorsConfig {
    fn default() -> Self {
        Self {
            default_url: String::new(),
            fallback_url: String::new(),
            request_timeout_ms: 5_000,
        }
    }
}

/// Health observer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Poll interval in milliseconds.
    pub interval_ms: u64,

    /// Timeout for one health call in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            timeout_ms: 2_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per cycle.
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    pub base_delay_ms: u64,

    /// Growth factor applied after each failed attempt.
    pub multiplier: u32,

    /// Upper bound for a single backoff delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Add up to 10% random jitter to each delay.
    pub jitter: bool,

    /// Cycles before a payment is dead-lettered. Unset means retry forever.
    pub max_cycles: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 2_000,
            multiplier: 2,
            max_delay_ms: 60_000,
            jitter: false,
            max_cycles: None,
        }
    }
}

/// Worker pool configuration for asynchronous delivery.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum payments being delivered at the same time.
    pub concurrency: usize,

    /// Accepted payments waiting for a free worker.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 256,
            queue_capacity: 50_000,
        }
    }
}

/// How `POST /payments` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Accept with 202 and deliver in the background.
    Async,
    /// Deliver inline and answer with the outcome.
    Sync,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub mode: DeliveryMode,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::Async,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    Memory,
    Redis,
}

/// Ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,

    /// Connection URL when `backend = "redis"`.
    pub redis_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Memory,
            redis_url: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Shipped admin key; refused whenever the admin surface is enabled.
pub const PLACEHOLDER_ADMIN_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the `/admin` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_ADMIN_KEY.to_string(),
        }
    }
}
