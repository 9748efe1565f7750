//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, body parsing)
//!     → handlers.rs (payments, summary, purge)
//!     → service layer
//!     → response.rs (error → status code)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{PaymentRequest, SummaryQuery, X_REQUEST_ID};
pub use response::ApiError;
pub use server::{AppState, HttpServer};
