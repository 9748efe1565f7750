//! Payment submission orchestration.
//!
//! # Data Flow
//! ```text
//! POST /payments
//!     → sync mode:  FailoverRouter::route → ledger record → outcome to caller
//!     → async mode: RetryScheduler::schedule_delivery → 202 to caller
//!
//! GET /payments-summary → PaymentLedger::summarize
//! POST /purge-payments  → PaymentLedger::purge
//! ```
//!
//! # Design Decisions
//! - The sync path reports persist failures; the async path only logs them
//! - Request timestamps come from the injected clock

pub mod payment_service;

pub use payment_service::{Accepted, PaymentService, SubmitError};
