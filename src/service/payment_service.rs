use std::sync::Arc;

use dashmap::DashSet;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::config::DeliveryMode;
use crate::ledger::{chargeable_cents, LedgerError, PaymentLedger, PaymentRecord, Summary};
use crate::observability::metrics;
use crate::processor::{Payment, ProcessorName};
use crate::resilience::{Clock, RetryScheduler, ScheduleError};
use crate::routing::{FailoverRouter, Outcome};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("amount {0} cannot be charged")]
    InvalidAmount(Decimal),
    /// Already recorded, or a submission with the same id is still in progress.
    #[error("payment {0} already submitted")]
    Duplicate(Uuid),
    #[error("ledger lookup failed: {0}")]
    Lookup(#[source] LedgerError),
    /// `attempted` is false when neither processor was reported available.
    #[error("payment not delivered (attempted: {attempted})")]
    NotDelivered { attempted: bool },
    #[error("payment delivered to {processor} but not recorded: {source}")]
    Persist {
        processor: ProcessorName,
        #[source]
        source: LedgerError,
    },
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// What happened to an accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
    /// Delivered and recorded inline.
    Delivered(ProcessorName),
    /// Handed to the retry scheduler.
    Queued,
}

#[derive(Clone)]
pub struct PaymentService {
    router: Arc<FailoverRouter>,
    ledger: Arc<dyn PaymentLedger>,
    scheduler: RetryScheduler,
    clock: Arc<dyn Clock>,
    mode: DeliveryMode,
    /// Correlation ids with a synchronous submission in progress.
    in_progress: Arc<DashSet<Uuid>>,
}

/// Removes a correlation id from the in-progress set when dropped.
struct InProgress<'a> {
    set: &'a DashSet<Uuid>,
    correlation_id: Uuid,
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.correlation_id);
    }
}

impl PaymentService {
    pub fn new(
        router: Arc<FailoverRouter>,
        ledger: Arc<dyn PaymentLedger>,
        scheduler: RetryScheduler,
        clock: Arc<dyn Clock>,
        mode: DeliveryMode,
    ) -> Self {
        Self {
            router,
            ledger,
            scheduler,
            clock,
            mode,
            in_progress: Arc::new(DashSet::new()),
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn router(&self) -> &Arc<FailoverRouter> {
        &self.router
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    /// Stamp a new payment and submit it in the configured mode.
    ///
    /// Nothing is sent to a processor unless the amount can be recorded and
    /// the correlation id is neither recorded nor already being delivered.
    pub async fn submit(&self, correlation_id: Uuid, amount: Decimal) -> Result<Accepted, SubmitError> {
        if chargeable_cents(amount).is_err() {
            return Err(SubmitError::InvalidAmount(amount));
        }
        if self.scheduler.is_scheduled(&correlation_id)
            || self.in_progress.contains(&correlation_id)
            || self.ledger.contains(correlation_id).await.map_err(SubmitError::Lookup)?
        {
            tracing::warn!(%correlation_id, "Duplicate payment submission");
            return Err(SubmitError::Duplicate(correlation_id));
        }

        let payment = Payment::new(correlation_id, amount, self.clock.now());
        match self.mode {
            DeliveryMode::Sync => self.submit_sync(&payment).await.map(Accepted::Delivered),
            DeliveryMode::Async => {
                self.submit_async(payment)?;
                Ok(Accepted::Queued)
            }
        }
    }

    /// Route inline and record on delivery.
    pub async fn submit_sync(&self, payment: &Payment) -> Result<ProcessorName, SubmitError> {
        let correlation_id = payment.correlation_id;
        if !self.in_progress.insert(correlation_id) {
            return Err(SubmitError::Duplicate(correlation_id));
        }
        let _in_progress = InProgress {
            set: &self.in_progress,
            correlation_id,
        };

        let processor = match self.router.route(payment).await {
            Outcome::Delivered(processor) => processor,
            Outcome::NotDelivered { attempted } => {
                tracing::warn!(%correlation_id, attempted, "Payment not delivered");
                return Err(SubmitError::NotDelivered { attempted });
            }
        };

        let record = PaymentRecord::delivered(payment, processor, self.clock.now())
            .map_err(|source| SubmitError::Persist { processor, source })?;
        if let Err(source) = self.ledger.record(record).await {
            metrics::record_ledger_error();
            tracing::error!(%correlation_id, %processor, error = %source, "Failed to record delivered payment");
            return Err(SubmitError::Persist { processor, source });
        }

        metrics::record_delivery(processor, "sync");
        tracing::info!(%correlation_id, %processor, "Payment delivered");
        Ok(processor)
    }

    /// Hand the payment to the background retry pool. Returns immediately.
    pub fn submit_async(&self, payment: Payment) -> Result<(), SubmitError> {
        let correlation_id = payment.correlation_id;
        self.scheduler.schedule_delivery(payment).map_err(|e| {
            tracing::warn!(%correlation_id, error = %e, "Payment rejected by retry scheduler");
            SubmitError::from(e)
        })
    }

    pub async fn summary(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Summary, LedgerError> {
        self.ledger.summarize(from, to).await
    }

    pub async fn purge(&self) -> Result<u64, LedgerError> {
        let removed = self.ledger.purge().await?;
        tracing::info!(removed, "Ledger purged");
        Ok(removed)
    }
}
