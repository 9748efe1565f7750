//! Failover under concurrent load with a processor going down mid-burst.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use payment_gateway::config::{DeliveryMode, WorkerConfig};
use payment_gateway::health::ProcessorHealth;
use payment_gateway::ledger::{InMemoryLedger, PaymentLedger};
use payment_gateway::lifecycle::Shutdown;
use payment_gateway::processor::{FakeProcessorClient, Payment, ProcessorName};
use payment_gateway::resilience::{DeliveryLoop, RetryPolicy, RetryScheduler, TokioClock};
use payment_gateway::routing::{FailoverRouter, Processor};
use payment_gateway::service::PaymentService;
use rust_decimal_macros::dec;
use uuid::Uuid;

mod common;

struct Harness {
    default: Arc<FakeProcessorClient>,
    fallback: Arc<FakeProcessorClient>,
    default_health: Arc<ProcessorHealth>,
    ledger: Arc<InMemoryLedger>,
    service: PaymentService,
    shutdown: Shutdown,
}

fn harness(mode: DeliveryMode) -> Harness {
    let default = Arc::new(FakeProcessorClient::new());
    let fallback = Arc::new(FakeProcessorClient::new());
    default.set_latency(Duration::from_millis(5));
    fallback.set_latency(Duration::from_millis(5));
    let default_health = Arc::new(ProcessorHealth::new());

    let router = Arc::new(FailoverRouter::new(
        Processor::new(ProcessorName::Default, default.clone(), default_health.clone()),
        Processor::new(ProcessorName::Fallback, fallback.clone(), Arc::new(ProcessorHealth::new())),
    ));
    let ledger = Arc::new(InMemoryLedger::new());
    let clock = Arc::new(TokioClock);
    let policy = RetryPolicy {
        backoff: payment_gateway::resilience::BackoffPolicy {
            base_ms: 10,
            multiplier: 2,
            max_ms: 100,
            jitter: false,
        },
        ..RetryPolicy::default()
    };
    let delivery = Arc::new(DeliveryLoop::new(router.clone(), ledger.clone(), clock.clone(), policy));
    let shutdown = Shutdown::new();
    let (scheduler, _dispatcher) = RetryScheduler::start(
        delivery,
        &WorkerConfig {
            concurrency: 32,
            queue_capacity: 1_000,
        },
        &shutdown,
    );
    let service = PaymentService::new(router, ledger.clone(), scheduler, clock, mode);

    Harness {
        default,
        fallback,
        default_health,
        ledger,
        service,
        shutdown,
    }
}

fn assert_each_delivered_once(h: &Harness, ids: &[Uuid]) {
    for id in ids {
        let on_default = h.default.has_accepted(id);
        let on_fallback = h.fallback.has_accepted(id);
        assert!(on_default ^ on_fallback, "payment {id} accepted by {on_default}/{on_fallback}");

        let record = h.ledger.get(id).expect("payment not recorded");
        let expected = if on_default {
            ProcessorName::Default
        } else {
            ProcessorName::Fallback
        };
        assert_eq!(record.processor, expected);
    }
    assert_eq!(h.ledger.len(), ids.len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_burst_with_default_going_down() {
    let h = harness(DeliveryMode::Async);
    let ids: Vec<Uuid> = (0..100).map(|_| Uuid::new_v4()).collect();

    for (i, id) in ids.iter().enumerate() {
        if i == 50 {
            // Processor dies first; the observer only notices afterwards.
            h.default.set_failing(true);
            tokio::time::sleep(Duration::from_millis(2)).await;
            h.default_health.set(false, 0);
        }
        h.service
            .submit_async(Payment::new(*id, dec!(10.00), Utc::now()))
            .unwrap();
    }

    let ledger = h.ledger.clone();
    assert!(
        common::eventually(Duration::from_secs(10), || ledger.len() == 100).await,
        "only {} of 100 payments recorded",
        h.ledger.len()
    );
    assert_each_delivered_once(&h, &ids);
    assert!(h.fallback.accepted_count() >= 50);

    let summary = h.ledger.summarize(None, None).await.unwrap();
    assert_eq!(
        summary.default.total_requests + summary.fallback.total_requests,
        100
    );
    assert_eq!(
        summary.default.total_amount + summary.fallback.total_amount,
        dec!(1000.00)
    );
    h.shutdown.trigger();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sync_burst_with_default_going_down() {
    let h = Arc::new(harness(DeliveryMode::Sync));
    let ids: Vec<Uuid> = (0..100).map(|_| Uuid::new_v4()).collect();

    let mut handles = Vec::new();
    for id in ids.iter().copied() {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.service.submit(id, dec!(1.25)).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(3)).await;
    h.default.set_failing(true);
    h.default_health.set(false, 0);

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_each_delivered_once(&h, &ids);
    h.shutdown.trigger();
}
