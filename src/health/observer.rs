//! Periodic health observation of one processor.
//!
//! # Responsibilities
//! - Poll the bound processor's health endpoint on a fixed interval
//! - Publish each successful verdict to its [`ProcessorHealth`]
//!
//! # Design Decisions
//! - A failed poll keeps the previous verdict (fail open on last known value)
//! - No out-of-band retry: the next tick is the retry
//! - Stops only on the shutdown signal

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::health::state::ProcessorHealth;
use crate::observability::metrics;
use crate::processor::{ProcessorClient, ProcessorError, ProcessorName};

/// Keeps one [`ProcessorHealth`] fresh.
pub struct HealthObserver {
    name: ProcessorName,
    client: Arc<dyn ProcessorClient>,
    health: Arc<ProcessorHealth>,
    interval: Duration,
    timeout: Duration,
}

impl HealthObserver {
    pub fn new(
        name: ProcessorName,
        client: Arc<dyn ProcessorClient>,
        health: Arc<ProcessorHealth>,
        config: &HealthCheckConfig,
    ) -> Self {
        Self {
            name,
            client,
            health,
            interval: Duration::from_millis(config.interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            processor = %self.name,
            interval_ms = self.interval.as_millis() as u64,
            "Health observer starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!(processor = %self.name, "Health observer received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run a single health check and publish the verdict.
    ///
    /// Returns whether the check produced a verdict.
    pub async fn poll_once(&self) -> bool {
        let result = match time::timeout(self.timeout, self.client.health()).await {
            Ok(result) => result,
            Err(_) => Err(ProcessorError::Timeout),
        };

        match result {
            Ok(response) => {
                let available = !response.failing;
                let previous = self.health.get();
                self.health.set(available, response.min_response_time);

                if previous.available != available {
                    tracing::info!(
                        processor = %self.name,
                        available,
                        min_response_time_ms = response.min_response_time,
                        "Processor availability changed"
                    );
                } else {
                    tracing::debug!(
                        processor = %self.name,
                        available,
                        min_response_time_ms = response.min_response_time,
                        "Health check completed"
                    );
                }
                metrics::record_processor_health(self.name, available, response.min_response_time);
                true
            }
            Err(e) => {
                tracing::warn!(
                    processor = %self.name,
                    error = %e,
                    "Health check failed, keeping last known state"
                );
                false
            }
        }
    }
}
