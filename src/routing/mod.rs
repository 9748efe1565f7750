//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Payment
//!     → failover.rs (read default health)
//!         available → submit to default → Ok: Delivered(default)
//!     → failover.rs (read fallback health)
//!         available → submit to fallback → Ok: Delivered(fallback)
//!     → NotDelivered
//! ```
//!
//! # Design Decisions
//! - Fixed order: default, then fallback
//! - Health is read, never written, on this path
//! - Routing is side-effecting on processors only; recording is the caller's job

pub mod failover;

pub use failover::{FailoverRouter, Outcome, Processor};
