//! HTTP surface of the service registry
//!
//! This library provides:
//! - Regex route table dispatching to registration and load balancing handlers
//! - Request validation mapped onto 400 responses
//! - Prometheus request metrics
//! - An HTTP/1 server loop with graceful shutdown

pub mod context;
pub mod handlers;
pub mod metrics;
pub mod router;
pub mod server;

pub use context::{RequestContext, ResponseEncoder};
pub use handlers::ApiError;
pub use metrics::MetricsCollector;
pub use router::{Handler, Router};
pub use server::serve;
