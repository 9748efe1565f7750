//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build clients and ledger → Start observers
//!     and retry pool → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop observers and retry loops → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Retry loops abandon their payment at the next wait on shutdown

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_parts, start_gateway, Gateway, GatewayParts, StartupError};
