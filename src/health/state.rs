//! Shared availability state for one processor.
//!
//! # States
//! - Available: router may attempt submissions
//! - Unavailable: router skips this processor
//!
//! # Design Decisions
//! - Backed by `ArcSwap`, so readers never block and never see a torn pair
//! - Only the latest observation is kept

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// One consistent observation of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub available: bool,
    pub min_response_time_ms: u64,
    /// Time of the poll that produced this snapshot; `None` before the first one.
    pub observed_at: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    fn initial() -> Self {
        Self {
            available: true,
            min_response_time_ms: 0,
            observed_at: None,
        }
    }
}

/// Concurrency-safe holder of the latest [`HealthSnapshot`].
#[derive(Debug)]
pub struct ProcessorHealth {
    current: ArcSwap<HealthSnapshot>,
}

impl ProcessorHealth {
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(HealthSnapshot::initial()),
        }
    }

    /// Replace the observation. Called only by the owning observer.
    pub fn set(&self, available: bool, min_response_time_ms: u64) {
        self.set_observed(available, min_response_time_ms, Utc::now());
    }

    pub fn set_observed(
        &self,
        available: bool,
        min_response_time_ms: u64,
        observed_at: DateTime<Utc>,
    ) {
        self.current.store(Arc::new(HealthSnapshot {
            available,
            min_response_time_ms,
            observed_at: Some(observed_at),
        }));
    }

    pub fn get(&self) -> HealthSnapshot {
        **self.current.load()
    }

    pub fn is_available(&self) -> bool {
        self.current.load().available
    }
}

impl Default for ProcessorHealth {
    fn default() -> Self {
        Self::new()
    }
}
