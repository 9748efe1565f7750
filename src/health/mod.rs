//! Processor health subsystem.
//!
//! # Data Flow
//! ```text
//! observer.rs (one task per processor):
//!     Periodic timer
//!     → ProcessorClient::health()
//!     → Ok: replace state.rs snapshot
//!     → Err: keep last snapshot, wait for next tick
//!
//! state.rs (ProcessorHealth):
//!     Single writer (its observer), many readers (router, retry loops)
//! ```
//!
//! # Design Decisions
//! - Availability is advisory; stale by at most one poll interval
//! - Optimistic start: a processor is available until a poll says otherwise
//! - Unreachability is not a state of its own; the last verdict stands
//! - The pair (available, min response time) is swapped as one value

pub mod observer;
pub mod state;

pub use observer::HealthObserver;
pub use state::{HealthSnapshot, ProcessorHealth};
