//! Asynchronous best-effort delivery.
//!
//! # States
//! - Attempting(cycle, n): run the failover router once
//! - BackingOff(cycle, n): wait before attempt n + 1 of the same cycle
//! - Cycling(cycle): the cycle's attempts are spent; wait, then start cycle + 1
//! - Delivered / DeadLettered: terminal
//!
//! # State Transitions
//! ```text
//! Attempting(c, n) → Delivered            : a processor accepted the payment
//! Attempting(c, n) → BackingOff(c, n)     : failed, n < max_attempts
//! Attempting(c, n) → Cycling(c)           : failed, n == max_attempts
//! Attempting(c, n) → DeadLettered         : failed, n == max_attempts, c == max_cycles
//! BackingOff(c, n) → Attempting(c, n + 1) : after backoff delay
//! Cycling(c)       → Attempting(c + 1, 1) : after backoff delay
//! ```
//!
//! # Design Decisions
//! - Without `max_cycles` a payment is retried until delivered or shutdown
//! - An in-flight attempt is never interrupted; shutdown is honored between attempts
//! - The queue is bounded and `schedule_delivery` never waits for room
//! - `workers.concurrency` caps routing attempts, not waiting loops: a permit is
//!   held for one `route` call and released before any backoff
//! - A correlation id is scheduled at most once until its loop ends

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, AcquireError, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::config::{RetryConfig, WorkerConfig};
use crate::ledger::{LedgerError, PaymentLedger, PaymentRecord};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::processor::{Payment, ProcessorName};
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::clock::Clock;
use crate::routing::{FailoverRouter, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting { cycle: u32, attempt: u32 },
    BackingOff { cycle: u32, attempt: u32, delay: Duration },
    Cycling { cycle: u32, delay: Duration },
    Delivered { processor: ProcessorName },
    DeadLettered { cycles: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub max_cycles: Option<u32>,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: BackoffPolicy::from_config(config),
            max_cycles: config.max_cycles,
        }
    }

    /// State that follows a failed attempt.
    pub fn after_failure(&self, cycle: u32, attempt: u32) -> RetryState {
        if attempt < self.max_attempts {
            return RetryState::BackingOff {
                cycle,
                attempt,
                delay: self.backoff.delay_after(attempt),
            };
        }
        if self.max_cycles.is_some_and(|max| cycle >= max) {
            return RetryState::DeadLettered { cycles: cycle };
        }
        RetryState::Cycling {
            cycle,
            delay: self.backoff.delay_after(attempt),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Drives one payment through the retry state machine.
pub struct DeliveryLoop {
    router: Arc<FailoverRouter>,
    ledger: Arc<dyn PaymentLedger>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    dead_letters: Arc<DashMap<Uuid, Payment>>,
}

impl DeliveryLoop {
    pub fn new(
        router: Arc<FailoverRouter>,
        ledger: Arc<dyn PaymentLedger>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            router,
            ledger,
            clock,
            policy,
            dead_letters: Arc::new(DashMap::new()),
        }
    }

    pub fn dead_letters(&self) -> Vec<Payment> {
        self.dead_letters.iter().map(|e| e.value().clone()).collect()
    }

    /// Run until the payment is delivered or dead-lettered.
    ///
    /// Returns `None` if shutdown interrupted the loop first.
    pub async fn deliver(
        &self,
        payment: &Payment,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Option<RetryState> {
        self.run(payment, shutdown, None).await
    }

    async fn run(
        &self,
        payment: &Payment,
        shutdown: &mut broadcast::Receiver<()>,
        mut gate: Option<AttemptGate>,
    ) -> Option<RetryState> {
        let correlation_id = payment.correlation_id;
        let mut state = RetryState::Attempting { cycle: 1, attempt: 1 };

        loop {
            state = match state {
                RetryState::Attempting { cycle, attempt } => {
                    let permit = match gate.as_mut() {
                        Some(gate) => tokio::select! {
                            permit = gate.admit() => permit.ok(),
                            _ = shutdown.recv() => return None,
                        },
                        None => None,
                    };
                    metrics::record_retry_attempt();
                    let outcome = self.router.route(payment).await;
                    drop(permit);
                    match outcome {
                        Outcome::Delivered(processor) => {
                            self.record(payment, processor).await;
                            RetryState::Delivered { processor }
                        }
                        Outcome::NotDelivered { attempted } => {
                            tracing::warn!(
                                %correlation_id,
                                cycle,
                                attempt,
                                max_attempts = self.policy.max_attempts,
                                attempted,
                                "Both processors failed"
                            );
                            self.policy.after_failure(cycle, attempt)
                        }
                    }
                }
                RetryState::BackingOff { cycle, attempt, delay } => {
                    tracing::debug!(%correlation_id, delay = ?delay, "Backing off before retry");
                    if !self.pause(delay, shutdown).await {
                        return None;
                    }
                    RetryState::Attempting {
                        cycle,
                        attempt: attempt + 1,
                    }
                }
                RetryState::Cycling { cycle, delay } => {
                    metrics::record_retry_cycle();
                    tracing::warn!(
                        %correlation_id,
                        cycle,
                        attempts = self.policy.max_attempts,
                        delay = ?delay,
                        "Payment not delivered after a full cycle, starting a new one"
                    );
                    if !self.pause(delay, shutdown).await {
                        return None;
                    }
                    RetryState::Attempting {
                        cycle: cycle + 1,
                        attempt: 1,
                    }
                }
                RetryState::DeadLettered { cycles } => {
                    metrics::record_dead_letter();
                    tracing::error!(%correlation_id, cycles, "Giving up on payment, moved to dead letters");
                    self.dead_letters.insert(correlation_id, payment.clone());
                    return Some(state);
                }
                RetryState::Delivered { .. } => return Some(state),
            };
        }
    }

    async fn pause(&self, delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
        tokio::select! {
            _ = self.clock.sleep(delay) => true,
            _ = shutdown.recv() => false,
        }
    }

    async fn record(&self, payment: &Payment, processor: ProcessorName) {
        let correlation_id = payment.correlation_id;
        let result = match PaymentRecord::delivered(payment, processor, self.clock.now()) {
            Ok(record) => self.ledger.record(record).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                metrics::record_delivery(processor, "async");
                tracing::info!(%correlation_id, %processor, "Payment delivered");
            }
            Err(LedgerError::Duplicate(_)) => {
                tracing::warn!(%correlation_id, %processor, "Payment already recorded");
            }
            Err(e) => {
                // Delivered at the processor but not persisted. Re-submitting would double-charge.
                metrics::record_ledger_error();
                tracing::error!(%correlation_id, %processor, error = %e, "Failed to record delivered payment");
            }
        }
    }
}

/// Shared cap on concurrent routing attempts.
struct AttemptGate {
    permits: Arc<Semaphore>,
    /// Permit the dispatcher acquired for the first attempt.
    first: Option<OwnedSemaphorePermit>,
}

impl AttemptGate {
    async fn admit(&mut self) -> Result<OwnedSemaphorePermit, AcquireError> {
        match self.first.take() {
            Some(permit) => Ok(permit),
            None => self.permits.clone().acquire_owned().await,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("retry queue is full")]
    QueueFull,
    #[error("retry scheduler is shutting down")]
    ShuttingDown,
    #[error("payment {0} is already scheduled")]
    AlreadyScheduled(Uuid),
}

/// Hands undelivered payments to a bounded pool of delivery loops.
#[derive(Clone)]
pub struct RetryScheduler {
    queue: mpsc::Sender<Payment>,
    delivery: Arc<DeliveryLoop>,
    in_flight: Arc<DashSet<Uuid>>,
}

impl RetryScheduler {
    /// Start the dispatcher. The returned handle completes after shutdown,
    /// once every in-flight loop has stopped.
    pub fn start(
        delivery: Arc<DeliveryLoop>,
        workers: &WorkerConfig,
        shutdown: &Shutdown,
    ) -> (Self, JoinHandle<()>) {
        let (queue, rx) = mpsc::channel(workers.queue_capacity.max(1));
        let permits = Arc::new(Semaphore::new(workers.concurrency.max(1)));

        tracing::info!(
            concurrency = workers.concurrency,
            queue_capacity = workers.queue_capacity,
            "Retry scheduler starting"
        );

        let in_flight = Arc::new(DashSet::new());
        let handle = tokio::spawn(dispatch(
            rx,
            delivery.clone(),
            permits,
            in_flight.clone(),
            shutdown.clone(),
        ));
        (
            Self {
                queue,
                delivery,
                in_flight,
            },
            handle,
        )
    }

    /// Queue a payment for background delivery. Never waits.
    ///
    /// Fails with `AlreadyScheduled` while an earlier submission of the same
    /// correlation id is queued or retrying.
    pub fn schedule_delivery(&self, payment: Payment) -> Result<(), ScheduleError> {
        let correlation_id = payment.correlation_id;
        if !self.in_flight.insert(correlation_id) {
            return Err(ScheduleError::AlreadyScheduled(correlation_id));
        }
        let result = self.queue.try_send(payment).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ScheduleError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ScheduleError::ShuttingDown,
        });
        if result.is_err() {
            self.in_flight.remove(&correlation_id);
        }
        metrics::record_queue_depth(self.queue_depth());
        result
    }

    pub fn is_scheduled(&self, correlation_id: &Uuid) -> bool {
        self.in_flight.contains(correlation_id)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.max_capacity() - self.queue.capacity()
    }

    pub fn dead_letters(&self) -> Vec<Payment> {
        self.delivery.dead_letters()
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<Payment>,
    delivery: Arc<DeliveryLoop>,
    permits: Arc<Semaphore>,
    in_flight: Arc<DashSet<Uuid>>,
    shutdown: Shutdown,
) {
    let mut stop = shutdown.subscribe();
    let mut tasks = JoinSet::new();

    loop {
        let payment = tokio::select! {
            next = rx.recv() => match next {
                Some(payment) => payment,
                None => break,
            },
            _ = stop.recv() => break,
        };

        // Wait for an attempt slot so the queue backs up while every slot is busy.
        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = stop.recv() => {
                tracing::warn!(correlation_id = %payment.correlation_id, "Dropping queued payment on shutdown");
                break;
            }
        };

        // Subscribe before checking the flag so a concurrent trigger is never missed.
        let mut task_shutdown = shutdown.subscribe();
        if shutdown.is_triggered() {
            break;
        }
        let delivery = delivery.clone();
        let gate = AttemptGate {
            permits: permits.clone(),
            first: Some(permit),
        };
        let in_flight = in_flight.clone();
        tasks.spawn(async move {
            let correlation_id = payment.correlation_id;
            if delivery.run(&payment, &mut task_shutdown, Some(gate)).await.is_none() {
                tracing::warn!(%correlation_id, "Delivery abandoned on shutdown");
            }
            in_flight.remove(&correlation_id);
        });

        while tasks.try_join_next().is_some() {}
    }

    rx.close();
    let mut abandoned = 0usize;
    while let Ok(payment) = rx.try_recv() {
        tracing::warn!(correlation_id = %payment.correlation_id, "Dropping queued payment on shutdown");
        abandoned += 1;
    }
    while tasks.join_next().await.is_some() {}
    tracing::info!(abandoned, "Retry scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ProcessorHealth;
    use crate::ledger::InMemoryLedger;
    use crate::processor::{FakeProcessorClient, ProcessorClient};
    use crate::resilience::clock::ManualClock;
    use crate::routing::Processor;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct Fixture {
        delivery: DeliveryLoop,
        default: Arc<FakeProcessorClient>,
        fallback: Arc<FakeProcessorClient>,
        ledger: Arc<InMemoryLedger>,
        clock: Arc<ManualClock>,
    }

    fn fixture(policy: RetryPolicy) -> Fixture {
        let default = Arc::new(FakeProcessorClient::new());
        let fallback = Arc::new(FakeProcessorClient::new());
        let router = Arc::new(FailoverRouter::new(
            Processor::new(ProcessorName::Default, default.clone(), Arc::new(ProcessorHealth::new())),
            Processor::new(ProcessorName::Fallback, fallback.clone(), Arc::new(ProcessorHealth::new())),
        ));
        let ledger = Arc::new(InMemoryLedger::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let delivery = DeliveryLoop::new(router, ledger.clone(), clock.clone(), policy);
        Fixture {
            delivery,
            default,
            fallback,
            ledger,
            clock,
        }
    }

    fn payment() -> Payment {
        Payment::new(Uuid::new_v4(), dec!(12.345), Utc::now())
    }

    #[test]
    fn test_policy_transitions() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.after_failure(1, 1),
            RetryState::BackingOff { cycle: 1, attempt: 1, delay: Duration::from_secs(2) }
        );
        assert_eq!(
            policy.after_failure(1, 4),
            RetryState::BackingOff { cycle: 1, attempt: 4, delay: Duration::from_secs(16) }
        );
        assert_eq!(
            policy.after_failure(3, 5),
            RetryState::Cycling { cycle: 3, delay: Duration::from_secs(32) }
        );

        let bounded = RetryPolicy {
            max_cycles: Some(2),
            ..RetryPolicy::default()
        };
        assert_eq!(bounded.after_failure(1, 5), RetryState::Cycling { cycle: 1, delay: Duration::from_secs(32) });
        assert_eq!(bounded.after_failure(2, 5), RetryState::DeadLettered { cycles: 2 });
    }

    #[tokio::test]
    async fn test_first_attempt_success_records_once() {
        let f = fixture(RetryPolicy::default());
        let (_tx, mut rx) = broadcast::channel(1);
        let p = payment();

        let state = f.delivery.deliver(&p, &mut rx).await;

        assert_eq!(state, Some(RetryState::Delivered { processor: ProcessorName::Default }));
        assert!(f.clock.sleeps().is_empty());
        let record = f.ledger.get(&p.correlation_id).unwrap();
        assert_eq!(record.amount_in_cents, 1235);
        assert_eq!(record.processor, ProcessorName::Default);
    }

    #[tokio::test]
    async fn test_backoff_schedule_within_a_cycle() {
        let f = fixture(RetryPolicy::default());
        // Four failed routing passes (default + fallback each), then success.
        f.default.fail_next(4);
        f.fallback.fail_next(4);
        let (_tx, mut rx) = broadcast::channel(1);

        let state = f.delivery.deliver(&payment(), &mut rx).await;

        assert_eq!(state, Some(RetryState::Delivered { processor: ProcessorName::Default }));
        let secs: Vec<u64> = f.clock.sleeps().iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![2, 4, 8, 16]);
        assert_eq!(f.ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_cycle_starts_a_new_one() {
        let f = fixture(RetryPolicy::default());
        // Cycle 1 fails entirely, cycle 2 succeeds on its second attempt.
        f.default.fail_next(6);
        f.fallback.fail_next(6);
        let (_tx, mut rx) = broadcast::channel(1);

        let state = f.delivery.deliver(&payment(), &mut rx).await;

        assert_eq!(state, Some(RetryState::Delivered { processor: ProcessorName::Default }));
        let secs: Vec<u64> = f.clock.sleeps().iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![2, 4, 8, 16, 32, 2]);
        assert_eq!(f.default.submit_count(), 7);
    }

    #[tokio::test]
    async fn test_recovered_fallback_is_used_mid_retry() {
        let f = fixture(RetryPolicy::default());
        f.default.set_failing(true);
        f.fallback.fail_next(2);
        let (_tx, mut rx) = broadcast::channel(1);

        let state = f.delivery.deliver(&payment(), &mut rx).await;

        assert_eq!(state, Some(RetryState::Delivered { processor: ProcessorName::Fallback }));
        assert_eq!(f.fallback.submit_count(), 3);
    }

    #[tokio::test]
    async fn test_cycle_limit_dead_letters() {
        let f = fixture(RetryPolicy {
            max_attempts: 2,
            max_cycles: Some(2),
            ..RetryPolicy::default()
        });
        f.default.set_failing(true);
        f.fallback.set_failing(true);
        let (_tx, mut rx) = broadcast::channel(1);
        let p = payment();

        let state = f.delivery.deliver(&p, &mut rx).await;

        assert_eq!(state, Some(RetryState::DeadLettered { cycles: 2 }));
        assert_eq!(f.default.submit_count(), 4);
        assert!(f.ledger.is_empty());
        assert_eq!(f.delivery.dead_letters(), vec![p]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let default = Arc::new(FakeProcessorClient::new());
        let fallback = Arc::new(FakeProcessorClient::new());
        default.set_failing(true);
        fallback.set_failing(true);
        let router = Arc::new(FailoverRouter::new(
            Processor::new(ProcessorName::Default, default.clone(), Arc::new(ProcessorHealth::new())),
            Processor::new(ProcessorName::Fallback, fallback, Arc::new(ProcessorHealth::new())),
        ));
        let delivery = DeliveryLoop::new(
            router,
            Arc::new(InMemoryLedger::new()),
            Arc::new(crate::resilience::clock::TokioClock),
            RetryPolicy::default(),
        );
        let (tx, mut rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            let p = payment();
            delivery.deliver(&p, &mut rx).await
        });
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        tx.send(()).unwrap();

        assert_eq!(handle.await.unwrap(), None);
        assert_eq!(default.submit_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undeliverable_payment_leaves_attempt_slot_free() {
        let default = Arc::new(FakeProcessorClient::new());
        let fallback = Arc::new(FakeProcessorClient::new());
        let router = Arc::new(FailoverRouter::new(
            Processor::new(ProcessorName::Default, default.clone(), Arc::new(ProcessorHealth::new())),
            Processor::new(ProcessorName::Fallback, fallback.clone(), Arc::new(ProcessorHealth::new())),
        ));
        let ledger = Arc::new(InMemoryLedger::new());
        let delivery = Arc::new(DeliveryLoop::new(
            router,
            ledger.clone(),
            Arc::new(crate::resilience::clock::TokioClock),
            RetryPolicy::default(),
        ));
        let shutdown = Shutdown::new();
        let workers = WorkerConfig {
            concurrency: 1,
            queue_capacity: 4,
        };
        let (scheduler, handle) = RetryScheduler::start(delivery, &workers, &shutdown);

        // Both processors already hold this id, so every attempt is a 422.
        let stuck = payment();
        default.submit_payment(&stuck).await.unwrap();
        fallback.submit_payment(&stuck).await.unwrap();
        scheduler.schedule_delivery(stuck.clone()).unwrap();

        let next = payment();
        scheduler.schedule_delivery(next.clone()).unwrap();

        for _ in 0..50 {
            if ledger.get(&next.correlation_id).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(ledger.get(&next.correlation_id).unwrap().processor, ProcessorName::Default);
        assert!(ledger.get(&stuck.correlation_id).is_none());
        assert!(scheduler.is_scheduled(&stuck.correlation_id));

        shutdown.trigger();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_same_payment_is_not_scheduled_twice() {
        let f = fixture(RetryPolicy::default());
        let ledger = f.ledger.clone();
        let shutdown = Shutdown::new();
        let workers = WorkerConfig {
            concurrency: 2,
            queue_capacity: 4,
        };
        let (scheduler, handle) = RetryScheduler::start(Arc::new(f.delivery), &workers, &shutdown);
        let p = payment();

        scheduler.schedule_delivery(p.clone()).unwrap();
        assert!(matches!(
            scheduler.schedule_delivery(p.clone()),
            Err(ScheduleError::AlreadyScheduled(id)) if id == p.correlation_id
        ));

        for _ in 0..100 {
            if ledger.get(&p.correlation_id).is_some() && !scheduler.is_scheduled(&p.correlation_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!scheduler.is_scheduled(&p.correlation_id));
        assert_eq!(f.default.accepted_count(), 1);
        assert_eq!(f.fallback.submit_count(), 0);

        shutdown.trigger();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_rejects_when_queue_full() {
        let f = fixture(RetryPolicy::default());
        let shutdown = Shutdown::new();
        // Saturate the single worker with a payment that never gets delivered.
        f.default.set_failing(true);
        f.fallback.set_failing(true);
        let workers = WorkerConfig {
            concurrency: 1,
            queue_capacity: 1,
        };
        let delivery = Arc::new(f.delivery);
        let (scheduler, handle) = RetryScheduler::start(delivery, &workers, &shutdown);

        let mut results = Vec::new();
        for _ in 0..4 {
            results.push(scheduler.schedule_delivery(payment()));
        }
        assert!(results.iter().any(|r| matches!(r, Err(ScheduleError::QueueFull))));

        shutdown.trigger();
        handle.await.unwrap();
        assert!(matches!(
            scheduler.schedule_delivery(payment()),
            Err(ScheduleError::ShuttingDown)
        ));
    }
}
