//! Payment gateway library: health-aware failover between two payment
//! processors, background retry with backoff, and a ledger of deliveries.

pub mod admin;
pub mod config;
pub mod health;
pub mod http;
pub mod ledger;
pub mod lifecycle;
pub mod observability;
pub mod processor;
pub mod resilience;
pub mod routing;
pub mod service;

pub use config::GatewayConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
