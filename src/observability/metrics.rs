//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_processor_available` (gauge): 1=available, 0=failing, by processor
//! - `gateway_processor_min_response_ms` (gauge): last reported minimum response time
//! - `gateway_submissions_total` (counter): submissions by processor, outcome
//! - `gateway_deliveries_total` (counter): recorded payments by processor, path
//! - `gateway_retry_attempts_total` (counter): failover passes run by delivery loops
//! - `gateway_retry_cycles_total` (counter): exhausted retry cycles
//! - `gateway_dead_letters_total` (counter): payments given up on
//! - `gateway_ledger_errors_total` (counter): delivered payments that failed to persist
//! - `gateway_retry_queue_depth` (gauge): payments waiting for a worker
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   exporter every call is a no-op, so tests need no setup

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::processor::ProcessorName;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_processor_health(processor: ProcessorName, available: bool, min_response_ms: u64) {
    let name = processor.as_str();
    gauge!("gateway_processor_available", "processor" => name).set(if available { 1.0 } else { 0.0 });
    gauge!("gateway_processor_min_response_ms", "processor" => name).set(min_response_ms as f64);
}

pub fn record_submission(processor: ProcessorName, accepted: bool) {
    let outcome = if accepted { "accepted" } else { "failed" };
    counter!(
        "gateway_submissions_total",
        "processor" => processor.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_delivery(processor: ProcessorName, path: &'static str) {
    counter!(
        "gateway_deliveries_total",
        "processor" => processor.as_str(),
        "path" => path
    )
    .increment(1);
}

pub fn record_retry_attempt() {
    counter!("gateway_retry_attempts_total").increment(1);
}

pub fn record_retry_cycle() {
    counter!("gateway_retry_cycles_total").increment(1);
}

pub fn record_dead_letter() {
    counter!("gateway_dead_letters_total").increment(1);
}

pub fn record_ledger_error() {
    counter!("gateway_ledger_errors_total").increment(1);
}

pub fn record_queue_depth(depth: usize) {
    gauge!("gateway_retry_queue_depth").set(depth as f64);
}
