//! Startup orchestration.
//!
//! # Responsibilities
//! - Build both processor clients and their health states
//! - Open the configured ledger
//! - Start the health observers and the retry worker pool
//! - Assemble the [`PaymentService`] the HTTP layer runs on
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Background tasks start before the listener binds (traffic only when ready)
//! - Collaborators can be injected through [`GatewayParts`] for tests

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{GatewayConfig, LedgerBackend};
use crate::health::{HealthObserver, ProcessorHealth};
use crate::ledger::{InMemoryLedger, LedgerError, PaymentLedger};
use crate::lifecycle::Shutdown;
use crate::processor::{HttpProcessorClient, ProcessorClient, ProcessorName};
use crate::resilience::{Clock, DeliveryLoop, RetryPolicy, RetryScheduler, TokioClock};
use crate::routing::{FailoverRouter, Processor};
use crate::service::PaymentService;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ledger backend '{0}' requires the '{1}' feature")]
    LedgerUnsupported(&'static str, &'static str),
    #[error("ledger.redis_url is required for the redis backend")]
    MissingRedisUrl,
    #[error("failed to open ledger: {0}")]
    Ledger(#[from] LedgerError),
}

/// Collaborators the gateway runs on.
pub struct GatewayParts {
    pub default: Arc<dyn ProcessorClient>,
    pub fallback: Arc<dyn ProcessorClient>,
    pub ledger: Arc<dyn PaymentLedger>,
    pub clock: Arc<dyn Clock>,
}

/// A started gateway: service plus the background tasks behind it.
pub struct Gateway {
    pub service: PaymentService,
    pub ledger: Arc<dyn PaymentLedger>,
    pub shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    pub fn health(&self, name: ProcessorName) -> Arc<ProcessorHealth> {
        self.service.router().processor(name).health.clone()
    }

    /// Wait for every background task to stop. Call after triggering shutdown.
    pub async fn drain(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task panicked");
            }
        }
        tracing::info!("Background tasks stopped");
    }
}

/// Build the production collaborators from config.
pub async fn build_parts(config: &GatewayConfig) -> Result<GatewayParts, StartupError> {
    let timeout = Duration::from_millis(config.processors.request_timeout_ms);
    let default = Arc::new(HttpProcessorClient::new(&config.processors.default_url, timeout));
    let fallback = Arc::new(HttpProcessorClient::new(&config.processors.fallback_url, timeout));

    Ok(GatewayParts {
        default,
        fallback,
        ledger: open_ledger(config).await?,
        clock: Arc::new(TokioClock),
    })
}

async fn open_ledger(config: &GatewayConfig) -> Result<Arc<dyn PaymentLedger>, StartupError> {
    match config.ledger.backend {
        LedgerBackend::Memory => {
            tracing::info!("Using in-memory ledger");
            Ok(Arc::new(InMemoryLedger::new()))
        }
        LedgerBackend::Redis => open_redis(config.ledger.redis_url.as_deref()).await,
    }
}

#[cfg(feature = "ledger-redis")]
async fn open_redis(url: Option<&str>) -> Result<Arc<dyn PaymentLedger>, StartupError> {
    let url = url.ok_or(StartupError::MissingRedisUrl)?;
    let ledger = crate::ledger::redis::RedisLedger::connect(url).await?;
    tracing::info!("Using redis ledger");
    Ok(Arc::new(ledger))
}

#[cfg(not(feature = "ledger-redis"))]
async fn open_redis(_url: Option<&str>) -> Result<Arc<dyn PaymentLedger>, StartupError> {
    Err(StartupError::LedgerUnsupported("redis", "ledger-redis"))
}

/// Wire the gateway together and start its background tasks.
pub fn start_gateway(config: &GatewayConfig, parts: GatewayParts, shutdown: &Shutdown) -> Gateway {
    let mut tasks = Vec::new();

    let default_health = Arc::new(ProcessorHealth::new());
    let fallback_health = Arc::new(ProcessorHealth::new());

    for (name, client, health) in [
        (ProcessorName::Default, parts.default.clone(), default_health.clone()),
        (ProcessorName::Fallback, parts.fallback.clone(), fallback_health.clone()),
    ] {
        let observer = HealthObserver::new(name, client, health, &config.health_check);
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(observer.run(rx)));
    }

    let router = Arc::new(FailoverRouter::new(
        Processor::new(ProcessorName::Default, parts.default, default_health),
        Processor::new(ProcessorName::Fallback, parts.fallback, fallback_health),
    ));

    let delivery = Arc::new(DeliveryLoop::new(
        router.clone(),
        parts.ledger.clone(),
        parts.clock.clone(),
        RetryPolicy::from_config(&config.retries),
    ));
    let (scheduler, dispatcher) = RetryScheduler::start(delivery, &config.workers, shutdown);
    tasks.push(dispatcher);

    let service = PaymentService::new(
        router,
        parts.ledger.clone(),
        scheduler,
        parts.clock,
        config.gateway.mode,
    );

    tracing::info!(
        mode = ?config.gateway.mode,
        default_url = %config.processors.default_url,
        fallback_url = %config.processors.fallback_url,
        "Gateway started"
    );

    Gateway {
        service,
        ledger: parts.ledger,
        shutdown: shutdown.clone(),
        tasks,
    }
}
