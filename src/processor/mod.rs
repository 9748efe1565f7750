//! Payment processor transport subsystem.
//!
//! # Data Flow
//! ```text
//! FailoverRouter / HealthObserver
//!     → client.rs (ProcessorClient trait, the only seam they see)
//!     → http_client.rs (reqwest against a processor base URL)
//!       or fake.rs (scripted in-memory processor for tests)
//!     → types.rs (wire shapes for payments, health, admin summary)
//! ```
//!
//! # Design Decisions
//! - Router and observer depend on `Arc<dyn ProcessorClient>` only
//! - Every call is a real round trip; nothing here caches health
//! - Non-2xx answers are errors, regardless of body
//! - Admin operations live on the same trait so one handle covers a processor

pub mod client;
pub mod fake;
pub mod http_client;
pub mod types;

pub use client::{ProcessorClient, ProcessorError};
pub use fake::FakeProcessorClient;
pub use http_client::HttpProcessorClient;
pub use types::{AdminSummary, HealthResponse, Payment, ProcessorName};
