//! Deterministic in-memory processor.
//!
//! Scriptable stand-in for a real processor: flip it to failing, make health
//! checks unreachable, add latency, and inspect every call it received.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::time::Instant;
use uuid::Uuid;

use crate::processor::client::{ProcessorClient, ProcessorError};
use crate::processor::types::{AdminSummary, HealthResponse, Payment};

/// One recorded submission.
#[derive(Debug, Clone)]
pub struct SubmitCall {
    pub correlation_id: Uuid,
    pub at: Instant,
    pub accepted: bool,
}

pub struct FakeProcessorClient {
    fee_rate: Decimal,
    failing: AtomicBool,
    health_failing: AtomicBool,
    health_unreachable: AtomicBool,
    min_response_time: AtomicU64,
    fail_next: AtomicUsize,
    latency_ms: AtomicU64,
    health_calls: AtomicUsize,
    calls: Mutex<Vec<SubmitCall>>,
    accepted: DashMap<Uuid, Payment>,
    token: Mutex<Option<String>>,
}

impl FakeProcessorClient {
    pub fn new() -> Self {
        Self::with_fee_rate(Decimal::new(5, 2))
    }

    pub fn with_fee_rate(fee_rate: Decimal) -> Self {
        Self {
            fee_rate,
            failing: AtomicBool::new(false),
            health_failing: AtomicBool::new(false),
            health_unreachable: AtomicBool::new(false),
            min_response_time: AtomicU64::new(0),
            fail_next: AtomicUsize::new(0),
            latency_ms: AtomicU64::new(0),
            health_calls: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            accepted: DashMap::new(),
            token: Mutex::new(None),
        }
    }

    /// Reject every submission with a 500 and report `failing` on health.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
        self.health_failing.store(failing, Ordering::SeqCst);
    }

    /// Change only what the health endpoint reports.
    pub fn set_health(&self, failing: bool, min_response_time: u64) {
        self.health_failing.store(failing, Ordering::SeqCst);
        self.min_response_time
            .store(min_response_time, Ordering::SeqCst);
    }

    /// Make the health endpoint fail at transport level.
    pub fn set_health_unreachable(&self, unreachable: bool) {
        self.health_unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Reject the next `n` submissions, then go back to normal.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn submit_calls(&self) -> Vec<SubmitCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn submit_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn has_accepted(&self, correlation_id: &Uuid) -> bool {
        self.accepted.contains_key(correlation_id)
    }

    pub fn token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|t| t.clone())
    }

    fn should_reject(&self) -> bool {
        if self.failing.load(Ordering::SeqCst) {
            return true;
        }
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for FakeProcessorClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessorClient for FakeProcessorClient {
    async fn submit_payment(&self, payment: &Payment) -> Result<String, ProcessorError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let rejected = self.should_reject();
        let duplicate = !rejected && self.accepted.contains_key(&payment.correlation_id);
        if !rejected && !duplicate {
            self.accepted.insert(payment.correlation_id, payment.clone());
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(SubmitCall {
                correlation_id: payment.correlation_id,
                at: Instant::now(),
                accepted: !rejected && !duplicate,
            });
        }

        if rejected {
            return Err(ProcessorError::Status {
                status: 500,
                body: "processor failing".to_string(),
            });
        }
        if duplicate {
            return Err(ProcessorError::Status {
                status: 422,
                body: "duplicate correlationId".to_string(),
            });
        }
        Ok("payment processed successfully".to_string())
    }

    async fn health(&self) -> Result<HealthResponse, ProcessorError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if self.health_unreachable.load(Ordering::SeqCst) {
            return Err(ProcessorError::Transport("connection refused".to_string()));
        }
        Ok(HealthResponse {
            failing: self.health_failing.load(Ordering::SeqCst),
            min_response_time: self.min_response_time.load(Ordering::SeqCst),
        })
    }

    async fn get_payment(&self, correlation_id: Uuid) -> Result<Payment, ProcessorError> {
        self.accepted
            .get(&correlation_id)
            .map(|p| p.value().clone())
            .ok_or_else(|| ProcessorError::Status {
                status: 404,
                body: "payment not found".to_string(),
            })
    }

    async fn admin_summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<AdminSummary, ProcessorError> {
        let mut total_requests = 0u64;
        let mut total_amount = Decimal::ZERO;
        for entry in self.accepted.iter() {
            let at = entry.value().requested_at;
            if from.is_some_and(|f| at < f) || to.is_some_and(|t| at > t) {
                continue;
            }
            total_requests += 1;
            total_amount += entry.value().amount;
        }
        Ok(AdminSummary {
            total_requests,
            total_amount,
            total_fee: total_amount * self.fee_rate,
            fee_per_transaction: self.fee_rate,
        })
    }

    async fn set_admin_token(&self, token: &str) -> Result<(), ProcessorError> {
        if let Ok(mut current) = self.token.lock() {
            *current = Some(token.to_string());
        }
        Ok(())
    }

    async fn set_admin_delay(&self, delay_ms: u64) -> Result<(), ProcessorError> {
        self.latency_ms.store(delay_ms, Ordering::SeqCst);
        self.min_response_time.store(delay_ms, Ordering::SeqCst);
        Ok(())
    }

    async fn set_admin_failure(&self, failure: bool) -> Result<(), ProcessorError> {
        self.set_failing(failure);
        Ok(())
    }

    async fn purge_payments(&self) -> Result<(), ProcessorError> {
        self.accepted.clear();
        Ok(())
    }
}
