//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Payment not deliverable right now:
//!     → retry.rs (RetryScheduler: bounded queue → worker pool)
//!     → retry.rs (DeliveryLoop state machine, one per payment)
//!         Attempting(n) → FailoverRouter
//!         BackingOff(n) → backoff.rs delay, slept on clock.rs
//!         Cycling       → start a fresh cycle of attempts
//!     → on success: ledger record
//! ```
//!
//! # Design Decisions
//! - Never drop an accepted payment unless a cycle limit is configured
//! - Attempts for one payment are strictly sequential
//! - Time is injected (clock.rs) so backoff can be fast-forwarded in tests
//! - Concurrency is capped by the worker pool, not by the request rate

pub mod backoff;
pub mod clock;
pub mod retry;

pub use backoff::BackoffPolicy;
pub use clock::{Clock, ManualClock, TokioClock};
pub use retry::{DeliveryLoop, RetryPolicy, RetryScheduler, RetryState, ScheduleError};
