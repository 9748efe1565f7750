//! Default-first failover between the two processors.
//!
//! # Responsibilities
//! - Decide, per payment, which processor to attempt and in what order
//! - Perform the submission and report which processor accepted it
//!
//! # Design Decisions
//! - Default is always tried first when it reports available (lower fee)
//! - The availability flag only gates whether to attempt; the attempt decides
//! - A failed default attempt falls through to fallback within the same call
//! - No network call at all when both processors report unavailable

use std::sync::Arc;

use crate::health::ProcessorHealth;
use crate::observability::metrics;
use crate::processor::{Payment, ProcessorClient, ProcessorName};

/// A processor's fixed identity: its name, its client, and its health state.
#[derive(Clone)]
pub struct Processor {
    pub name: ProcessorName,
    pub client: Arc<dyn ProcessorClient>,
    pub health: Arc<ProcessorHealth>,
}

impl Processor {
    pub fn new(
        name: ProcessorName,
        client: Arc<dyn ProcessorClient>,
        health: Arc<ProcessorHealth>,
    ) -> Self {
        Self {
            name,
            client,
            health,
        }
    }
}

/// Result of one routing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered(ProcessorName),
    /// `attempted` is false when neither processor was available to try.
    NotDelivered { attempted: bool },
}

impl Outcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Delivered(_))
    }
}

pub struct FailoverRouter {
    default: Processor,
    fallback: Processor,
}

impl FailoverRouter {
    pub fn new(default: Processor, fallback: Processor) -> Self {
        Self { default, fallback }
    }

    pub fn processor(&self, name: ProcessorName) -> &Processor {
        match name {
            ProcessorName::Default => &self.default,
            ProcessorName::Fallback => &self.fallback,
        }
    }

    /// Processors in routing order.
    pub fn processors(&self) -> [&Processor; 2] {
        [&self.default, &self.fallback]
    }

    pub async fn route(&self, payment: &Payment) -> Outcome {
        let mut attempted = false;

        for processor in self.processors() {
            if !processor.health.is_available() {
                tracing::debug!(
                    correlation_id = %payment.correlation_id,
                    processor = %processor.name,
                    "Processor unavailable, skipping"
                );
                continue;
            }

            attempted = true;
            match processor.client.submit_payment(payment).await {
                Ok(_) => {
                    metrics::record_submission(processor.name, true);
                    tracing::debug!(
                        correlation_id = %payment.correlation_id,
                        processor = %processor.name,
                        "Payment accepted by processor"
                    );
                    return Outcome::Delivered(processor.name);
                }
                Err(e) => {
                    metrics::record_submission(processor.name, false);
                    tracing::warn!(
                        correlation_id = %payment.correlation_id,
                        processor = %processor.name,
                        error = %e,
                        "Processor submission failed"
                    );
                }
            }
        }

        Outcome::NotDelivered { attempted }
    }
}
