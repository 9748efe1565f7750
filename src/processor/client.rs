//! Processor client capability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::processor::types::{AdminSummary, HealthResponse, Payment};

/// Failure of a single call against a processor.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("processor answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode processor response: {0}")]
    Decode(String),
}

impl ProcessorError {
    /// HTTP status of the answer, if the processor answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProcessorError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Everything the gateway can ask of one payment processor.
///
/// Implemented by [`HttpProcessorClient`](crate::processor::HttpProcessorClient)
/// for real processors and [`FakeProcessorClient`](crate::processor::FakeProcessorClient)
/// for tests.
#[async_trait]
pub trait ProcessorClient: Send + Sync {
    /// Submit a payment. Returns the processor's confirmation message.
    async fn submit_payment(&self, payment: &Payment) -> Result<String, ProcessorError>;

    /// Query `GET /payments/service-health`.
    async fn health(&self) -> Result<HealthResponse, ProcessorError>;

    /// Look up a payment the processor has accepted.
    async fn get_payment(&self, correlation_id: Uuid) -> Result<Payment, ProcessorError>;

    async fn admin_summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AdminSummary, ProcessorError>;

    async fn set_admin_token(&self, token: &str) -> Result<(), ProcessorError>;

    /// Artificial processing delay, in milliseconds.
    async fn set_admin_delay(&self, delay_ms: u64) -> Result<(), ProcessorError>;

    async fn set_admin_failure(&self, failure: bool) -> Result<(), ProcessorError>;

    async fn purge_payments(&self) -> Result<(), ProcessorError>;
}
